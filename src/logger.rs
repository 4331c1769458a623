//! Logging setup

use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber. `RUST_LOG` wins over `level` when set.
/// Safe to call more than once; later calls are ignored.
pub fn init_logger(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .try_init();
}
