//! Metrics for scene-runtime.
//!
//! Recorded through the `metrics` facade; the embedding application decides
//! whether and where to export them.
//!
//! ## Metrics
//!
//! ### Counters
//! - `scene_guard_calls_total` - Guard invocations by guard kind and outcome
//! - `scene_guard_trailing_runs_total` - Trailing re-runs performed by singleton guards
//! - `scene_registry_ops_total` - Registry operations by kind, op and whether the name was known
//! - `scene_script_executions_total` - Script invocations by status
//!
//! ### Histograms
//! - `scene_script_duration_seconds` - Script evaluation duration

use metrics::{counter, histogram};
use std::time::Duration;

// =============================================================================
// Guard Metrics
// =============================================================================

/// Record a guard invocation.
///
/// `outcome` is one of `executed`, `dropped`, `queued`.
pub fn record_guard_call(guard: &'static str, outcome: &'static str) {
    counter!(
        "scene_guard_calls_total",
        "guard" => guard,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a trailing re-run.
pub fn record_trailing_run() {
    counter!("scene_guard_trailing_runs_total").increment(1);
}

// =============================================================================
// Registry Metrics
// =============================================================================

/// Record a registry operation.
pub fn record_registry_op(kind: &'static str, op: &'static str, hit: bool) {
    counter!(
        "scene_registry_ops_total",
        "kind" => kind,
        "op" => op,
        "hit" => if hit { "true" } else { "false" }
    )
    .increment(1);
}

// =============================================================================
// Script Metrics
// =============================================================================

/// Record a script execution.
pub fn record_script_execution(status: &'static str, duration: Duration) {
    counter!("scene_script_executions_total", "status" => status).increment(1);
    histogram!("scene_script_duration_seconds").record(duration.as_secs_f64());
}
