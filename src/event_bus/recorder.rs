//! Capture and offline analysis of run event streams.

use std::io::Result as IoResult;
use std::sync::{Arc, Mutex};

use rustc_hash::{FxHashMap, FxHashSet};

use super::event::{Event, EventBody};
use super::sink::EventSink;
use crate::types::{BuildStatus, VertexId};

/// Difference between two consecutive `vertices_sorted` events in a stream,
/// e.g. across repeated runs of an edited graph.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SortDiff {
    pub added: Vec<VertexId>,
    pub removed: Vec<VertexId>,
}

/// Sink that accumulates the full ordered event log and derives summaries
/// from it after the run.
///
/// Cloning the recorder shares the underlying log, so one clone can be
/// registered as an observer while another inspects the captured stream.
#[derive(Clone, Default)]
pub struct EventRecorder {
    entries: Arc<Mutex<Vec<Event>>>,
}

impl EventRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ordered copy of every captured event.
    pub fn snapshot(&self) -> Vec<Event> {
        self.entries.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Serialize the captured log for persistence.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.snapshot())
    }

    /// Load a previously persisted log.
    pub fn from_json(json: &str) -> Result<Vec<Event>, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Replay a stream into the terminal status of every vertex it touched.
    ///
    /// Later events win, so a vertex rebuilt by a loop reports the status of
    /// its final iteration.
    #[must_use]
    pub fn terminal_statuses(events: &[Event]) -> FxHashMap<VertexId, BuildStatus> {
        let mut statuses = FxHashMap::default();
        for event in events {
            match &event.body {
                EventBody::BuildStart { vertex_id } => {
                    statuses.insert(vertex_id.clone(), BuildStatus::Building);
                }
                EventBody::EndVertex {
                    vertex_id, status, ..
                } => {
                    statuses.insert(vertex_id.clone(), *status);
                }
                _ => {}
            }
        }
        statuses
    }

    /// Reported build duration per vertex, in milliseconds. A vertex built
    /// more than once keeps the sum over its iterations.
    #[must_use]
    pub fn vertex_durations(events: &[Event]) -> FxHashMap<VertexId, u64> {
        let mut durations: FxHashMap<VertexId, u64> = FxHashMap::default();
        for event in events {
            if let EventBody::EndVertex {
                vertex_id,
                duration_ms,
                ..
            } = &event.body
            {
                *durations.entry(vertex_id.clone()).or_default() += duration_ms;
            }
        }
        durations
    }

    /// Number of builds in flight after each lifecycle event, keyed by
    /// sequence number. Shows the concurrency profile of a run.
    #[must_use]
    pub fn builds_in_flight(events: &[Event]) -> Vec<(u64, usize)> {
        let mut in_flight: FxHashSet<&VertexId> = FxHashSet::default();
        let mut profile = Vec::new();
        for event in events {
            match &event.body {
                EventBody::BuildStart { vertex_id } => {
                    in_flight.insert(vertex_id);
                    profile.push((event.sequence, in_flight.len()));
                }
                // Terminal events without a matching start, such as a
                // deactivated branch, do not change the profile.
                EventBody::EndVertex { vertex_id, .. } => {
                    if in_flight.remove(vertex_id) {
                        profile.push((event.sequence, in_flight.len()));
                    }
                }
                _ => {}
            }
        }
        profile
    }

    /// Vertex-set changes between consecutive `vertices_sorted` events.
    #[must_use]
    pub fn sort_diffs(events: &[Event]) -> Vec<SortDiff> {
        let mut diffs = Vec::new();
        let mut previous: Option<&[VertexId]> = None;
        for event in events {
            if let EventBody::VerticesSorted { ids, .. } = &event.body {
                if let Some(prev) = previous {
                    let before: FxHashSet<&VertexId> = prev.iter().collect();
                    let after: FxHashSet<&VertexId> = ids.iter().collect();
                    diffs.push(SortDiff {
                        added: ids
                            .iter()
                            .filter(|id| !before.contains(id))
                            .cloned()
                            .collect(),
                        removed: prev
                            .iter()
                            .filter(|id| !after.contains(id))
                            .cloned()
                            .collect(),
                    });
                }
                previous = Some(ids);
            }
        }
        diffs
    }
}

impl EventSink for EventRecorder {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        self.entries.lock().unwrap().push(event.clone());
        Ok(())
    }
}
