use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::types::VertexId;

/// Handle for requesting cancellation of an in-flight run.
///
/// Cancellation is cooperative: the run loop checks the flag between
/// layers, so vertices already building finish before the run stops.
#[derive(Clone, Debug, Default)]
pub struct CancellationHandle {
    flag: Arc<AtomicBool>,
}

impl CancellationHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Per-run mutable state threaded through execution.
#[derive(Debug)]
pub struct RunContext {
    run_id: String,
    cancellation: CancellationHandle,
    iterations: FxHashMap<VertexId, u32>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            cancellation: CancellationHandle::default(),
            iterations: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Clone a handle that can cancel this run from another task.
    #[must_use]
    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.cancellation.clone()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Completed iterations for a loop vertex. Non-loop vertices stay at 0.
    #[must_use]
    pub fn iteration(&self, vertex_id: &str) -> u32 {
        self.iterations.get(vertex_id).copied().unwrap_or(0)
    }

    /// Record one more completed iteration and return the new count.
    pub fn bump_iteration(&mut self, vertex_id: &str) -> u32 {
        let count = self.iterations.entry(vertex_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }
}
