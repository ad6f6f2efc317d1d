//! Tracing setup for binaries, demos, and tests.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber: compact output, `RUST_LOG` filtering,
/// `info` by default. Safe to call more than once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .try_init();
}
