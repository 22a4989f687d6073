//! Logging setup.
//!
//! Library code only emits `tracing` events; binaries call [`init_logging`]
//! once at startup. The filter comes from `RUST_LOG` (default: `info`).

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info";

/// Build the env filter, falling back to [`DEFAULT_FILTER`].
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize the global tracing subscriber.
///
/// Returns `false` if a subscriber was already installed (for example by a
/// host application), in which case the existing one is left in place.
pub fn init_logging() -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(env_filter()),
        )
        .try_init()
        .is_ok()
}
