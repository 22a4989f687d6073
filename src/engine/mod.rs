//! Execution-control engine pieces shared by scene elements.

pub mod rate_limiter;
pub mod script;

pub use rate_limiter::{
    debounce_registry, throttle_registry, RateLimitKind, RateLimiter, RateLimiterDirectories,
    RateLimiterRegistry,
};
pub use script::{Bindings, BoundScript, ScriptContext, ScriptExecutor, DEFAULT_MODULE_BINDING};
