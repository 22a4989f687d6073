//! scene-runtime - execution-control primitives for scene elements
//!
//! Scenes are YAML-described sequences of elements (HTTP calls, prompts,
//! jobs, delays). Elements can be triggered repeatedly and overlap, and they
//! rely on three primitives to stay well-behaved:
//!
//! - **Guards** ([`guard`]): at most one in-flight run per element, optionally
//!   remembering one trailing run.
//! - **Rate limiter directories** ([`engine::rate_limiter`]): named debounce
//!   and throttle handles that any element can touch, cancel, flush or delete.
//! - **Script functions** ([`engine::script`]): inline scripts compiled into
//!   functions that only see the bindings they are given.
//!
//! ## Example
//!
//! ```no_run
//! use scene_runtime::engine::{Bindings, ScriptContext, ScriptExecutor};
//! use scene_runtime::guard::MutexGuard;
//! use serde_json::json;
//!
//! # async fn example() -> scene_runtime::Result<()> {
//! let executor = ScriptExecutor::default();
//! let context = ScriptContext::new(json!({ "retries": 3 }));
//!
//! let run = MutexGuard::new(|bindings: Bindings| {
//!     let pending = executor.call_function_script("this.retries * factor", &context, bindings);
//!     async move { pending?.await }
//! });
//!
//! let result = run.call(Bindings::new().with("factor", json!(2))).await;
//! assert_eq!(result.transpose()?, Some(json!(6)));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod guard;
pub mod metrics;
pub mod telemetry;

pub use config::Config;
pub use error::{Error, Result};
