//! Serialized graph description, as produced by an editor or loaded from
//! disk. Descriptors are resolved into live vertices and edges by
//! [`Graph::from_payload`](super::Graph::from_payload).

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::VertexId;

/// One vertex to instantiate: a component type plus initial field values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: VertexId,
    #[serde(rename = "type")]
    pub type_tag: String,
    /// Initial values for the component's input fields.
    #[serde(default)]
    pub config: FxHashMap<String, Value>,
}

impl NodeDescriptor {
    #[must_use]
    pub fn new(id: impl Into<VertexId>, type_tag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_tag: type_tag.into(),
            config: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, field: impl Into<String>, value: Value) -> Self {
        self.config.insert(field.into(), value);
        self
    }
}

/// One connection between a source output and a target input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeDescriptor {
    pub source_id: VertexId,
    pub source_output: String,
    pub target_id: VertexId,
    pub target_input: String,
}

impl EdgeDescriptor {
    #[must_use]
    pub fn new(
        source_id: impl Into<VertexId>,
        source_output: impl Into<String>,
        target_id: impl Into<VertexId>,
        target_input: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            source_output: source_output.into(),
            target_id: target_id.into(),
            target_input: target_input.into(),
        }
    }
}

/// A complete graph description. Node order is significant: it fixes the
/// deterministic tie-break used by scheduling.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphPayload {
    pub nodes: Vec<NodeDescriptor>,
    #[serde(default)]
    pub edges: Vec<EdgeDescriptor>,
}

impl GraphPayload {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_node(mut self, node: NodeDescriptor) -> Self {
        self.nodes.push(node);
        self
    }

    #[must_use]
    pub fn with_edge(mut self, edge: EdgeDescriptor) -> Self {
        self.edges.push(edge);
        self
    }
}
