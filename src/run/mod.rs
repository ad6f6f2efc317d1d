//! Per-run state: configuration, context, and runnable-vertex tracking.

pub mod config;
pub mod context;
pub mod manager;

pub use config::{ConfigError, RunConfig};
pub use context::{CancellationHandle, RunContext};
pub use manager::RunManager;
