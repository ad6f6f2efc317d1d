//! Serializable event schema emitted by the run loop.
//!
//! Events are plain data: they carry ids, statuses, and messages, never
//! references to live vertices or components, so a recorded stream can be
//! persisted and replayed without the graph that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{BuildStatus, VertexId};

/// How a run ended, carried by the final `end` event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every branch reached a terminal status.
    Completed,
    /// Cancellation was observed at a layer boundary.
    Cancelled,
}

/// One mutation/lifecycle record from a graph run.
///
/// `sequence` is strictly monotonic per [`EventManager`](super::EventManager)
/// and matches the true temporal order of emission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub body: EventBody,
}

/// Kind-specific payloads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventBody {
    /// Execution order was computed; `to_run` is the first runnable layer.
    VerticesSorted {
        ids: Vec<VertexId>,
        to_run: Vec<VertexId>,
    },
    /// A vertex entered `Building`.
    BuildStart { vertex_id: VertexId },
    /// A vertex reached a terminal status; summary of the build result.
    EndVertex {
        vertex_id: VertexId,
        status: BuildStatus,
        valid: bool,
        duration_ms: u64,
        cached: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// A vertex's outputs finished propagating to its successors.
    BuildEnd { vertex_id: VertexId },
    /// The run finished.
    End { outcome: RunOutcome },
    /// A build or construction failure, attributed to a vertex when known.
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        vertex_id: Option<VertexId>,
        message: String,
    },
}

impl EventBody {
    /// Stable string tag for this event kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::VerticesSorted { .. } => "vertices_sorted",
            Self::BuildStart { .. } => "build_start",
            Self::EndVertex { .. } => "end_vertex",
            Self::BuildEnd { .. } => "build_end",
            Self::End { .. } => "end",
            Self::Error { .. } => "error",
        }
    }

    /// The vertex this event is about, when it is about one.
    #[must_use]
    pub fn vertex_id(&self) -> Option<&str> {
        match self {
            Self::BuildStart { vertex_id }
            | Self::EndVertex { vertex_id, .. }
            | Self::BuildEnd { vertex_id } => Some(vertex_id),
            Self::Error { vertex_id, .. } => vertex_id.as_deref(),
            Self::VerticesSorted { .. } | Self::End { .. } => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.body.vertex_id() {
            Some(id) => write!(f, "#{} {}({id})", self.sequence, self.body.kind()),
            None => write!(f, "#{} {}", self.sequence, self.body.kind()),
        }
    }
}
