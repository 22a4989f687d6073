//! Singleton guard - one call at a time, optionally remembering one more.

use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use super::state::{GuardPhase, GuardState};
use crate::metrics;

/// Singleton guard options.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingletonOptions {
    /// Remember one call that arrives while locked and run it afterwards
    pub trailing: bool,
}

/// Wraps an asynchronous callable so at most one invocation runs at a time.
///
/// Without trailing mode this behaves like [`MutexGuard`](super::MutexGuard).
/// With trailing mode, the first call arriving while locked is absorbed and
/// turned into exactly one extra run once the current one finishes. Further
/// arrivals are dropped.
///
/// The trailing run reuses the arguments of the call that was running, not
/// those of the call that requested it: the request only says "run once
/// more". The caller of the original run receives the trailing run's result.
pub struct SingletonGuard<F> {
    func: F,
    state: Arc<GuardState>,
}

impl<F> SingletonGuard<F> {
    /// Wrap `func` with the given options.
    pub fn new(func: F, options: SingletonOptions) -> Self {
        Self {
            func,
            state: Arc::new(GuardState::new(options.trailing)),
        }
    }

    /// Wrap `func` with trailing mode enabled.
    pub fn trailing(func: F) -> Self {
        Self::new(func, SingletonOptions { trailing: true })
    }

    /// Run the callable under the guard.
    ///
    /// Returns `None` when the call was dropped or absorbed as the trailing
    /// request.
    pub async fn call<A, Fut>(&self, args: A) -> Option<Fut::Output>
    where
        A: Clone,
        F: Fn(A) -> Fut,
        Fut: Future,
    {
        let Some(mut lock) = self.state.try_acquire() else {
            if self.state.absorb() {
                debug!("Singleton guard locked, trailing call queued");
                metrics::record_guard_call("singleton", "queued");
            } else {
                debug!("Singleton guard locked, dropping call");
                metrics::record_guard_call("singleton", "dropped");
            }
            return None;
        };

        metrics::record_guard_call("singleton", "executed");
        loop {
            lock.begin_run();
            let result = (self.func)(args.clone()).await;

            if !lock.finish() {
                return Some(result);
            }

            debug!("Running trailing call with the finished call's arguments");
            metrics::record_trailing_run();
        }
    }

    /// Whether a call is currently in flight.
    pub fn is_locked(&self) -> bool {
        self.state.is_locked()
    }

    /// Whether a trailing run is queued.
    pub fn has_pending_trailing(&self) -> bool {
        self.state.has_pending_trailing()
    }

    /// Current phase of the guard.
    pub fn phase(&self) -> GuardPhase {
        self.state.phase()
    }
}

impl<F: Clone> Clone for SingletonGuard<F> {
    fn clone(&self) -> Self {
        Self {
            func: self.func.clone(),
            state: Arc::clone(&self.state),
        }
    }
}
