//! Mutex guard - drop calls that arrive while a call is in flight.

use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use super::state::{GuardPhase, GuardState};
use crate::metrics;

/// Wraps a callable so at most one invocation runs at a time.
///
/// A call made while another is in flight returns `None` immediately: it is
/// not queued, not retried, and never reaches the wrapped callable. Errors are
/// part of the callable's output and reach only the caller whose invocation
/// actually ran.
///
/// Arguments are passed as one value; use a tuple for several and `()` for
/// none. Clones share the same lock.
pub struct MutexGuard<F> {
    func: F,
    state: Arc<GuardState>,
}

impl<F> MutexGuard<F> {
    /// Wrap `func`.
    pub fn new(func: F) -> Self {
        Self {
            func,
            state: Arc::new(GuardState::new(false)),
        }
    }

    /// Run an asynchronous callable under the guard.
    ///
    /// The lock is held until the callable's future settles and is released
    /// even if it panics or the returned future is dropped.
    pub async fn call<A, Fut>(&self, args: A) -> Option<Fut::Output>
    where
        F: Fn(A) -> Fut,
        Fut: Future,
    {
        let Some(_lock) = self.state.try_acquire() else {
            debug!("Mutex guard locked, dropping call");
            metrics::record_guard_call("mutex", "dropped");
            return None;
        };

        metrics::record_guard_call("mutex", "executed");
        Some((self.func)(args).await)
    }

    /// Run a synchronous callable under the guard.
    ///
    /// The lock is released as soon as the value is computed. A re-entrant
    /// call made from inside the callable returns `None`.
    pub fn call_sync<A, T>(&self, args: A) -> Option<T>
    where
        F: Fn(A) -> T,
    {
        let Some(_lock) = self.state.try_acquire() else {
            debug!("Mutex guard locked, dropping call");
            metrics::record_guard_call("mutex", "dropped");
            return None;
        };

        metrics::record_guard_call("mutex", "executed");
        Some((self.func)(args))
    }

    /// Whether a call is currently in flight.
    pub fn is_locked(&self) -> bool {
        self.state.is_locked()
    }

    /// Current phase of the guard.
    pub fn phase(&self) -> GuardPhase {
        self.state.phase()
    }
}

impl<F: Clone> Clone for MutexGuard<F> {
    fn clone(&self) -> Self {
        Self {
            func: self.func.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::OnceLock;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_concurrent_calls_run_once() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();
        let guard = MutexGuard::new(move |n: u32| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                n * 2
            }
        });

        let results = join_all((0..5).map(|n| guard.call(n))).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(results[0], Some(0));
        assert_eq!(results.iter().filter(|r| r.is_none()).count(), 4);
        assert!(!guard.is_locked());
    }

    #[tokio::test]
    async fn test_back_to_back_second_call_dropped() {
        let guard = MutexGuard::new(|_: ()| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            "done"
        });

        let start = Instant::now();
        // join! polls the first call until it suspends inside the callable,
        // then issues the second one while the lock is held.
        let (first, (second, second_elapsed)) = tokio::join!(guard.call(()), async {
            let issued = Instant::now();
            let result = guard.call(()).await;
            (result, issued.elapsed())
        });

        assert_eq!(first, Some("done"));
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(second, None);
        assert!(second_elapsed < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_sequential_calls_both_run() {
        let guard = MutexGuard::new(|n: i32| async move { n + 1 });
        assert_eq!(guard.call(1).await, Some(2));
        assert_eq!(guard.call(2).await, Some(3));
    }

    #[tokio::test]
    async fn test_error_propagates_and_lock_released() {
        let guard = MutexGuard::new(|fail: bool| async move {
            if fail {
                Err("boom")
            } else {
                Ok(1)
            }
        });

        assert_eq!(guard.call(true).await, Some(Err("boom")));
        assert!(!guard.is_locked());
        assert_eq!(guard.call(false).await, Some(Ok(1)));
    }

    #[tokio::test]
    async fn test_dropped_future_releases_lock() {
        let guard = MutexGuard::new(|_: ()| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let timed_out = tokio::time::timeout(Duration::from_millis(10), guard.call(())).await;
        assert!(timed_out.is_err());
        assert!(!guard.is_locked());
    }

    #[tokio::test]
    async fn test_multiple_arguments_as_tuple() {
        let guard = MutexGuard::new(|(a, b): (i64, i64)| async move { a * b });
        assert_eq!(guard.call((6, 7)).await, Some(42));
    }

    #[test]
    fn test_sync_call_releases_immediately() {
        let guard = MutexGuard::new(|s: &str| s.len());
        assert_eq!(guard.call_sync("abc"), Some(3));
        assert!(!guard.is_locked());
        assert_eq!(guard.call_sync("abcd"), Some(4));
    }

    type Recursive = MutexGuard<Box<dyn Fn(u32) -> Option<u32> + Send + Sync>>;

    #[test]
    fn test_sync_reentrant_call_dropped() {
        let slot: Arc<OnceLock<Recursive>> = Arc::new(OnceLock::new());
        let inner = slot.clone();
        let guard: Recursive = MutexGuard::new(Box::new(move |n: u32| {
            // Re-enter the guard from inside the wrapped callable
            inner.get().and_then(|g| g.call_sync(n + 1)).flatten()
        }));
        assert!(slot.set(guard).is_ok());

        let guard = slot.get().unwrap();
        assert_eq!(guard.call_sync(0), Some(None));
        assert!(!guard.is_locked());
    }

    #[tokio::test]
    async fn test_clones_share_lock() {
        let guard = MutexGuard::new(|_: ()| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            1
        });
        let other = guard.clone();

        let (a, b) = tokio::join!(guard.call(()), other.call(()));
        assert_eq!(a, Some(1));
        assert_eq!(b, None);
    }
}
