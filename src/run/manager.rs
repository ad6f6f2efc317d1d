//! Runnable-vertex bookkeeping for a single run.
//!
//! Mirrors the dependency-counting side of execution: which vertices still
//! need building, which are blocked on unbuilt predecessors, and which are
//! currently in flight. Graph shape stays in the graph; this tracks only
//! per-run progress.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::types::VertexId;

/// Tracks build progress over the run's dependency maps.
///
/// Scheduling order comes from the non-feedback predecessor map, while
/// successor bookkeeping covers feedback edges too, so a vertex waiting on
/// a feedback value is released when its source builds.
#[derive(Debug, Default)]
pub struct RunManager {
    /// Insertion order of the full graph, used as the deterministic
    /// tie-break whenever several vertices are runnable at once.
    order: Vec<VertexId>,
    /// Remaining unbuilt predecessors per pending vertex.
    run_predecessors: FxHashMap<VertexId, FxHashSet<VertexId>>,
    /// Original non-feedback predecessors, kept for requeueing.
    original_predecessors: FxHashMap<VertexId, Vec<VertexId>>,
    /// Successors over all edges, feedback included.
    successors: FxHashMap<VertexId, Vec<VertexId>>,
    to_run: FxHashSet<VertexId>,
    being_run: FxHashSet<VertexId>,
    built: FxHashSet<VertexId>,
}

impl RunManager {
    /// Seed the manager with every vertex pending. `predecessors` must
    /// exclude feedback edges; `successors` must include them.
    #[must_use]
    pub fn new(
        order: Vec<VertexId>,
        predecessors: &FxHashMap<VertexId, Vec<VertexId>>,
        successors: FxHashMap<VertexId, Vec<VertexId>>,
    ) -> Self {
        let to_run: FxHashSet<VertexId> = order.iter().cloned().collect();
        let run_predecessors = order
            .iter()
            .map(|id| {
                let preds: FxHashSet<VertexId> = predecessors
                    .get(id)
                    .into_iter()
                    .flatten()
                    .filter(|p| to_run.contains(*p))
                    .cloned()
                    .collect();
                (id.clone(), preds)
            })
            .collect();
        Self {
            order,
            run_predecessors,
            original_predecessors: predecessors.clone(),
            successors,
            to_run,
            being_run: FxHashSet::default(),
            built: FxHashSet::default(),
        }
    }

    /// A vertex is runnable when it is still pending, not already in
    /// flight, and has no unbuilt predecessors.
    #[must_use]
    pub fn is_runnable(&self, vertex_id: &str) -> bool {
        self.to_run.contains(vertex_id)
            && !self.being_run.contains(vertex_id)
            && self
                .run_predecessors
                .get(vertex_id)
                .is_none_or(FxHashSet::is_empty)
    }

    /// Collect every currently runnable vertex in insertion order and mark
    /// them in flight. Returns an empty layer when nothing can progress.
    pub fn next_layer(&mut self) -> Vec<VertexId> {
        let layer: Vec<VertexId> = self
            .order
            .iter()
            .filter(|id| self.is_runnable(id))
            .cloned()
            .collect();
        for id in &layer {
            self.being_run.insert(id.clone());
        }
        layer
    }

    /// Record a finished build and unblock its successors.
    pub fn mark_built(&mut self, vertex_id: &str) {
        self.being_run.remove(vertex_id);
        self.to_run.remove(vertex_id);
        self.built.insert(vertex_id.to_string());
        self.remove_from_predecessors(vertex_id);
    }

    /// Drop a vertex from the run without treating it as built. Its
    /// successors are unblocked so branch deactivation can walk past it.
    pub fn deactivate(&mut self, vertex_id: &str) {
        self.being_run.remove(vertex_id);
        self.to_run.remove(vertex_id);
        self.remove_from_predecessors(vertex_id);
    }

    fn remove_from_predecessors(&mut self, vertex_id: &str) {
        if let Some(successors) = self.successors.get(vertex_id) {
            for succ in successors.clone() {
                if let Some(preds) = self.run_predecessors.get_mut(&succ) {
                    preds.remove(vertex_id);
                }
            }
        }
    }

    /// Park an in-flight vertex back in the pending pool without building
    /// it. Used for a loop vertex awaiting its feedback value; requeueing
    /// the feedback sources re-blocks it on them.
    pub fn defer(&mut self, vertex_id: &str) {
        self.being_run.remove(vertex_id);
        if let Some(preds) = self.run_predecessors.get_mut(vertex_id) {
            preds.clear();
        }
    }

    /// Put already-built vertices back into the pending pool for another
    /// loop iteration.
    ///
    /// Each requeued vertex waits again on its original pending
    /// predecessors, except `exclude` (the loop vertex, whose outputs for
    /// this iteration are already in place). Pending successors of a
    /// requeued vertex are re-blocked on it, feedback targets included.
    pub fn requeue(&mut self, ids: &[VertexId], exclude: &str) {
        for id in ids {
            self.built.remove(id);
            self.to_run.insert(id.clone());
        }
        for id in ids {
            let preds: FxHashSet<VertexId> = self
                .original_predecessors
                .get(id)
                .into_iter()
                .flatten()
                .filter(|p| self.to_run.contains(*p) && p.as_str() != exclude)
                .cloned()
                .collect();
            self.run_predecessors.insert(id.clone(), preds);
        }
        for id in ids {
            if let Some(successors) = self.successors.get(id) {
                for succ in successors.clone() {
                    if succ.as_str() != exclude
                        && !self.being_run.contains(&succ)
                        && self.to_run.contains(&succ)
                        && !ids.contains(&succ)
                    {
                        if let Some(preds) = self.run_predecessors.get_mut(&succ) {
                            preds.insert(id.clone());
                        }
                    } else if succ.as_str() == exclude {
                        // The deferred loop vertex waits on its feedback
                        // sources among the requeued vertices.
                        if let Some(preds) = self.run_predecessors.get_mut(&succ) {
                            preds.insert(id.clone());
                        }
                    }
                }
            }
        }
    }

    #[must_use]
    pub fn is_built(&self, vertex_id: &str) -> bool {
        self.built.contains(vertex_id)
    }

    /// Whether a vertex still awaits (re)building in this run.
    #[must_use]
    pub fn is_pending(&self, vertex_id: &str) -> bool {
        self.to_run.contains(vertex_id)
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.to_run.len()
    }

    /// Pending vertex ids in insertion order.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<VertexId> {
        self.order
            .iter()
            .filter(|id| self.to_run.contains(*id))
            .cloned()
            .collect()
    }
}
