//! Named rate limiter directories.
//!
//! Elements that debounce or throttle their triggers register their limiter
//! handle under a name, so unrelated elements can poke it by name:
//!
//! ```yaml
//! - name: refresh
//!   debounce: { wait: 500 }
//! - name: save
//!   exec: debounce.touch('refresh')
//! ```
//!
//! The limiter itself (timers, windows) belongs to the owning element and is
//! reached through the [`RateLimiter`] trait. The directory only looks handles
//! up: touching, cancelling or flushing an unknown name is a no-op, and
//! entries are never created implicitly.
//!
//! Deleting an entry takes it out of the directory and then cancels it, so
//! no timer can fire for a name that is gone.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use tracing::{debug, warn};

use crate::metrics;

/// Handle to a debounced or throttled action owned by an element.
pub trait RateLimiter: Send + Sync {
    /// Re-arm or extend the window, optionally carrying a payload for the
    /// eventual execution.
    fn touch(&self, data: Option<Value>);

    /// Abort any pending execution without running it.
    fn cancel(&self);

    /// Run whatever is pending now, as if the window had elapsed.
    fn flush(&self);
}

/// Rate limiting policy a directory holds handles for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitKind {
    /// Execute after a quiet period following the last touch
    Debounce,
    /// Execute at most once per window regardless of touches
    Throttle,
}

impl RateLimitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitKind::Debounce => "debounce",
            RateLimitKind::Throttle => "throttle",
        }
    }
}

impl fmt::Display for RateLimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directory of named rate limiter handles.
///
/// Generic over the handle type so element-specific handles can be stored
/// without boxing; the default is a trait object. Handles are called outside
/// the directory lock, so a handle may re-enter the directory from its
/// callbacks.
pub struct RateLimiterRegistry<H: ?Sized = dyn RateLimiter> {
    kind: RateLimitKind,
    limiters: RwLock<HashMap<String, Arc<H>>>,
}

impl<H: RateLimiter + ?Sized> RateLimiterRegistry<H> {
    /// Create an empty directory for the given policy.
    pub fn new(kind: RateLimitKind) -> Self {
        Self {
            kind,
            limiters: RwLock::new(HashMap::new()),
        }
    }

    /// Policy this directory holds handles for.
    pub fn kind(&self) -> RateLimitKind {
        self.kind
    }

    /// Register the handle owned by an element.
    ///
    /// A handle already registered under `name` is cancelled before it is
    /// replaced. Returns whether a handle was replaced.
    pub fn register(&self, name: &str, limiter: Arc<H>) -> bool {
        let previous = self.write().insert(name.to_string(), limiter);
        match previous {
            Some(previous) => {
                warn!(kind = %self.kind, name, "Replacing registered rate limiter");
                previous.cancel();
                true
            }
            None => {
                debug!(kind = %self.kind, name, "Registered rate limiter");
                false
            }
        }
    }

    /// Forward a touch to the named handle. Unknown names are ignored.
    pub fn touch(&self, name: &str, data: Option<Value>) {
        let limiter = self.get(name);
        metrics::record_registry_op(self.kind.as_str(), "touch", limiter.is_some());
        match limiter {
            Some(limiter) => limiter.touch(data),
            None => debug!(kind = %self.kind, name, "Touch on unknown rate limiter ignored"),
        }
    }

    /// Cancel the named handle's pending execution. Unknown names are ignored.
    pub fn cancel(&self, name: &str) {
        let limiter = self.get(name);
        metrics::record_registry_op(self.kind.as_str(), "cancel", limiter.is_some());
        if let Some(limiter) = limiter {
            limiter.cancel();
        }
    }

    /// Run the named handle's pending execution now. Unknown names are ignored.
    pub fn flush(&self, name: &str) {
        let limiter = self.get(name);
        metrics::record_registry_op(self.kind.as_str(), "flush", limiter.is_some());
        if let Some(limiter) = limiter {
            limiter.flush();
        }
    }

    /// Cancel and remove the named handle. Returns whether it existed.
    ///
    /// The entry leaves the directory before it is cancelled, so a concurrent
    /// touch can no longer reach it and re-arm it afterwards.
    pub fn delete(&self, name: &str) -> bool {
        let removed = self.write().remove(name);
        metrics::record_registry_op(self.kind.as_str(), "delete", removed.is_some());

        match removed {
            Some(limiter) => {
                limiter.cancel();
                debug!(kind = %self.kind, name, "Deleted rate limiter");
                true
            }
            None => false,
        }
    }

    /// Look up a handle.
    pub fn get(&self, name: &str) -> Option<Arc<H>> {
        self.read().get(name).cloned()
    }

    /// Check if a name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered handles.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no handles are registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Cancel and remove every handle.
    pub fn clear(&self) {
        let drained: Vec<(String, Arc<H>)> = self.write().drain().collect();
        for (name, limiter) in drained {
            limiter.cancel();
            debug!(kind = %self.kind, name = %name, "Cleared rate limiter");
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<H>>> {
        // Handles never run under the lock, so a poisoned map is still consistent.
        self.limiters.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<H>>> {
        self.limiters.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl<H: ?Sized> fmt::Debug for RateLimiterRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.limiters.read().map(|m| m.len()).unwrap_or_default();
        f.debug_struct("RateLimiterRegistry")
            .field("kind", &self.kind)
            .field("len", &len)
            .finish()
    }
}

/// One directory per policy, shared by every element of a run.
///
/// Construct once at startup and hand clones to elements; clones share the
/// same directories.
#[derive(Debug, Clone)]
pub struct RateLimiterDirectories {
    pub debounce: Arc<RateLimiterRegistry>,
    pub throttle: Arc<RateLimiterRegistry>,
}

impl RateLimiterDirectories {
    /// Create fresh, empty directories.
    pub fn new() -> Self {
        Self {
            debounce: Arc::new(RateLimiterRegistry::new(RateLimitKind::Debounce)),
            throttle: Arc::new(RateLimiterRegistry::new(RateLimitKind::Throttle)),
        }
    }

    /// The process-wide directories.
    pub fn global() -> Self {
        Self {
            debounce: debounce_registry(),
            throttle: throttle_registry(),
        }
    }

    /// Directory for the given policy.
    pub fn for_kind(&self, kind: RateLimitKind) -> &Arc<RateLimiterRegistry> {
        match kind {
            RateLimitKind::Debounce => &self.debounce,
            RateLimitKind::Throttle => &self.throttle,
        }
    }
}

impl Default for RateLimiterDirectories {
    fn default() -> Self {
        Self::new()
    }
}

static DEBOUNCE_REGISTRY: OnceLock<Arc<RateLimiterRegistry>> = OnceLock::new();
static THROTTLE_REGISTRY: OnceLock<Arc<RateLimiterRegistry>> = OnceLock::new();

/// Process-wide debounce directory, created on first access.
pub fn debounce_registry() -> Arc<RateLimiterRegistry> {
    DEBOUNCE_REGISTRY
        .get_or_init(|| Arc::new(RateLimiterRegistry::new(RateLimitKind::Debounce)))
        .clone()
}

/// Process-wide throttle directory, created on first access.
pub fn throttle_registry() -> Arc<RateLimiterRegistry> {
    THROTTLE_REGISTRY
        .get_or_init(|| Arc::new(RateLimiterRegistry::new(RateLimitKind::Throttle)))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::task::JoinHandle;

    /// Handle recording the calls it receives.
    #[derive(Default)]
    struct RecordingLimiter {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingLimiter {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl RateLimiter for RecordingLimiter {
        fn touch(&self, data: Option<Value>) {
            let entry = match data {
                Some(data) => format!("touch:{}", data),
                None => "touch".to_string(),
            };
            self.calls.lock().unwrap().push(entry);
        }

        fn cancel(&self) {
            self.calls.lock().unwrap().push("cancel".to_string());
        }

        fn flush(&self) {
            self.calls.lock().unwrap().push("flush".to_string());
        }
    }

    /// Minimal timer-backed debouncer: touch schedules the action after `wait`.
    struct TimerLimiter {
        wait: Duration,
        fired: Arc<AtomicU32>,
        pending: Mutex<Option<JoinHandle<()>>>,
    }

    impl TimerLimiter {
        fn new(wait: Duration, fired: Arc<AtomicU32>) -> Self {
            Self {
                wait,
                fired,
                pending: Mutex::new(None),
            }
        }
    }

    impl RateLimiter for TimerLimiter {
        fn touch(&self, _data: Option<Value>) {
            let fired = self.fired.clone();
            let wait = self.wait;
            let task = tokio::spawn(async move {
                tokio::time::sleep(wait).await;
                fired.fetch_add(1, Ordering::SeqCst);
            });
            if let Some(previous) = self.pending.lock().unwrap().replace(task) {
                previous.abort();
            }
        }

        fn cancel(&self) {
            if let Some(task) = self.pending.lock().unwrap().take() {
                task.abort();
            }
        }

        fn flush(&self) {
            if let Some(task) = self.pending.lock().unwrap().take() {
                task.abort();
                self.fired.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_forwards_to_registered_handle() {
        let registry: RateLimiterRegistry = RateLimiterRegistry::new(RateLimitKind::Debounce);
        let limiter = Arc::new(RecordingLimiter::default());
        assert!(!registry.register("refresh", limiter.clone()));

        registry.touch("refresh", None);
        registry.touch("refresh", Some(serde_json::json!({"id": 1})));
        registry.flush("refresh");
        registry.cancel("refresh");

        assert_eq!(
            limiter.calls(),
            vec!["touch", "touch:{\"id\":1}", "flush", "cancel"]
        );
    }

    #[test]
    fn test_unknown_names_are_noops() {
        let registry: RateLimiterRegistry = RateLimiterRegistry::new(RateLimitKind::Throttle);

        registry.touch("missing", None);
        registry.cancel("missing");
        registry.flush("missing");

        assert!(!registry.contains("missing"));
        assert!(registry.is_empty());
        assert!(!registry.delete("missing"));
    }

    #[test]
    fn test_delete_cancels_then_removes() {
        let registry: RateLimiterRegistry = RateLimiterRegistry::new(RateLimitKind::Debounce);
        let limiter = Arc::new(RecordingLimiter::default());
        registry.register("save", limiter.clone());

        assert!(registry.delete("save"));
        assert_eq!(limiter.calls(), vec!["cancel"]);
        assert!(!registry.contains("save"));

        // Later operations on the name no longer reach the handle
        registry.touch("save", None);
        assert_eq!(limiter.calls(), vec!["cancel"]);
        assert!(!registry.delete("save"));
    }

    #[test]
    fn test_register_replacement_cancels_previous() {
        let registry: RateLimiterRegistry = RateLimiterRegistry::new(RateLimitKind::Debounce);
        let first = Arc::new(RecordingLimiter::default());
        let second = Arc::new(RecordingLimiter::default());

        registry.register("poll", first.clone());
        assert!(registry.register("poll", second.clone()));
        registry.touch("poll", None);

        assert_eq!(first.calls(), vec!["cancel"]);
        assert_eq!(second.calls(), vec!["touch"]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_clear_cancels_everything() {
        let registry: RateLimiterRegistry = RateLimiterRegistry::new(RateLimitKind::Throttle);
        let a = Arc::new(RecordingLimiter::default());
        let b = Arc::new(RecordingLimiter::default());
        registry.register("b", b.clone());
        registry.register("a", a.clone());
        assert_eq!(registry.names(), vec!["a", "b"]);

        registry.clear();

        assert!(registry.is_empty());
        assert_eq!(a.calls(), vec!["cancel"]);
        assert_eq!(b.calls(), vec!["cancel"]);
    }

    #[tokio::test]
    async fn test_touch_then_delete_never_fires() {
        let registry: RateLimiterRegistry = RateLimiterRegistry::new(RateLimitKind::Debounce);
        let fired = Arc::new(AtomicU32::new(0));
        registry.register(
            "x",
            Arc::new(TimerLimiter::new(Duration::from_millis(20), fired.clone())),
        );

        registry.touch("x", None);
        assert!(registry.delete("x"));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_touch_fires_after_wait_and_flush_fires_now() {
        let registry: RateLimiterRegistry = RateLimiterRegistry::new(RateLimitKind::Debounce);
        let fired = Arc::new(AtomicU32::new(0));
        registry.register(
            "x",
            Arc::new(TimerLimiter::new(Duration::from_millis(20), fired.clone())),
        );

        registry.touch("x", None);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        registry.touch("x", None);
        registry.flush("x");
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    /// Handle whose cancel lets another thread touch the same name before
    /// returning.
    struct ContendedLimiter {
        registry: Arc<RateLimiterRegistry>,
        armed: AtomicBool,
    }

    impl RateLimiter for ContendedLimiter {
        fn touch(&self, _data: Option<Value>) {
            self.armed.store(true, Ordering::SeqCst);
        }

        fn cancel(&self) {
            self.armed.store(false, Ordering::SeqCst);
            let registry = self.registry.clone();
            std::thread::spawn(move || registry.touch("x", None))
                .join()
                .unwrap();
        }

        fn flush(&self) {}
    }

    #[test]
    fn test_touch_racing_delete_cannot_rearm() {
        let registry: Arc<RateLimiterRegistry> =
            Arc::new(RateLimiterRegistry::new(RateLimitKind::Debounce));
        let limiter = Arc::new(ContendedLimiter {
            registry: registry.clone(),
            armed: AtomicBool::new(false),
        });
        registry.register("x", limiter.clone());
        registry.touch("x", None);
        assert!(limiter.armed.load(Ordering::SeqCst));

        assert!(registry.delete("x"));

        assert!(!registry.contains("x"));
        assert!(!limiter.armed.load(Ordering::SeqCst));
    }

    /// Handle that deletes itself from the directory when flushed.
    struct SelfDeleting {
        registry: Arc<RateLimiterRegistry>,
        name: String,
    }

    impl RateLimiter for SelfDeleting {
        fn touch(&self, _data: Option<Value>) {}
        fn cancel(&self) {}
        fn flush(&self) {
            self.registry.delete(&self.name);
        }
    }

    #[test]
    fn test_handle_may_reenter_directory() {
        let registry: Arc<RateLimiterRegistry> =
            Arc::new(RateLimiterRegistry::new(RateLimitKind::Debounce));
        registry.register(
            "once",
            Arc::new(SelfDeleting {
                registry: registry.clone(),
                name: "once".to_string(),
            }),
        );

        registry.flush("once");
        assert!(!registry.contains("once"));
    }

    #[test]
    fn test_global_directories_are_shared() {
        let a = debounce_registry();
        let b = RateLimiterDirectories::global();
        assert!(Arc::ptr_eq(&a, &b.debounce));
        assert!(Arc::ptr_eq(&throttle_registry(), b.for_kind(RateLimitKind::Throttle)));
        assert_eq!(a.kind(), RateLimitKind::Debounce);
    }

    #[test]
    fn test_fresh_directories_are_independent() {
        let dirs = RateLimiterDirectories::new();
        dirs.debounce
            .register("only-debounce", Arc::new(RecordingLimiter::default()));

        assert!(dirs.debounce.contains("only-debounce"));
        assert!(!dirs.throttle.contains("only-debounce"));

        let shared = dirs.clone();
        assert!(shared.debounce.contains("only-debounce"));
    }

    #[test]
    fn test_concrete_handle_type() {
        let registry: RateLimiterRegistry<RecordingLimiter> =
            RateLimiterRegistry::new(RateLimitKind::Throttle);
        let limiter = Arc::new(RecordingLimiter::default());
        registry.register("typed", limiter.clone());
        registry.touch("typed", None);
        assert_eq!(registry.get("typed").unwrap().calls(), vec!["touch"]);
    }
}
