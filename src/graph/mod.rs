//! The graph: resolved vertices and edges plus the derived scheduling
//! structure (adjacency maps, layers, and loop regions).
//!
//! A [`Graph`] is built once from a [`GraphPayload`] against a component
//! registry, validated structurally at construction, and then run any
//! number of times via [`Graph::run`].

pub mod execution;
pub mod payload;
pub mod topology;

pub use execution::{RunOptions, RunReport, VertexReport};
pub use payload::{EdgeDescriptor, GraphPayload, NodeDescriptor};
pub use topology::Adjacency;

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::debug;

use crate::component::ComponentRegistry;
use crate::edge::{Edge, EdgeError};
use crate::types::VertexId;
use crate::vertex::{Vertex, VertexError};

/// Structural problems found while resolving a payload, plus the one
/// runtime safety net ([`GraphError::Stalled`]).
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("duplicate vertex id {id:?}")]
    #[diagnostic(
        code(flowgraph::graph::duplicate_vertex),
        help("every node in the payload needs a unique id")
    )]
    DuplicateVertex { id: VertexId },

    #[error("vertex {id:?} references unknown component type {type_tag:?}")]
    #[diagnostic(
        code(flowgraph::graph::unknown_component),
        help("register the component type before building the graph")
    )]
    UnknownComponentType { id: VertexId, type_tag: String },

    #[error("invalid config for vertex {id:?}")]
    #[diagnostic(code(flowgraph::graph::config))]
    Config {
        id: VertexId,
        #[source]
        #[diagnostic_source]
        source: VertexError,
    },

    #[error("edge references missing vertex: {source_id:?} -> {target_id:?}")]
    #[diagnostic(
        code(flowgraph::graph::dangling_edge),
        help("both edge endpoints must name nodes present in the payload")
    )]
    DanglingEdge {
        source_id: VertexId,
        target_id: VertexId,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Edge(#[from] EdgeError),

    #[error("cycle without a loop vertex: {vertices:?}")]
    #[diagnostic(
        code(flowgraph::graph::cycle),
        help("cycles are only legal when they pass through a loop component")
    )]
    CycleWithoutLoop { vertices: Vec<VertexId> },

    #[error("cycle contains more than one loop vertex: {vertices:?}")]
    #[diagnostic(
        code(flowgraph::graph::nested_loop),
        help("each cycle must be governed by exactly one loop component")
    )]
    NestedLoop { vertices: Vec<VertexId> },

    #[error("cycle cannot be broken at its loop vertex: {vertices:?}")]
    #[diagnostic(
        code(flowgraph::graph::unbreakable_cycle),
        help("every path around the cycle must re-enter through the loop component")
    )]
    UnbreakableCycle { vertices: Vec<VertexId> },

    #[error("run stalled with {pending:?} unbuildable vertices")]
    #[diagnostic(code(flowgraph::graph::stalled))]
    Stalled { pending: Vec<VertexId> },
}

/// A cyclic region governed by one loop vertex.
#[derive(Clone, Debug)]
pub(crate) struct LoopRegion {
    /// Region members in insertion order, loop vertex included.
    pub members: Vec<VertexId>,
    /// Outputs of the loop vertex that feed back into the region. Their
    /// presence in a build result means the loop wants another iteration.
    pub body_outputs: FxHashSet<String>,
}

/// Executable graph resolved against a component registry.
#[derive(Debug)]
pub struct Graph {
    vertices: FxHashMap<VertexId, Vertex>,
    order: Vec<VertexId>,
    edges: Vec<Edge>,
    /// Adjacency over non-feedback edges; what scheduling sees.
    adjacency: Adjacency,
    /// Initial layering, recomputed per run for the sorted event.
    layers: Vec<Vec<VertexId>>,
    loops: FxHashMap<VertexId, LoopRegion>,
    edges_by_source: FxHashMap<VertexId, Vec<usize>>,
}

impl Graph {
    /// Resolve a payload into an executable graph.
    ///
    /// Validates ids, component types, config fields, edge endpoints and
    /// type compatibility, and cycle legality. Edges closing a legal cycle
    /// into its loop vertex are tagged as feedback and excluded from
    /// scheduling order.
    pub fn from_payload(
        payload: &GraphPayload,
        registry: &dyn ComponentRegistry,
    ) -> Result<Self, GraphError> {
        let mut vertices: FxHashMap<VertexId, Vertex> = FxHashMap::default();
        let mut order: Vec<VertexId> = Vec::with_capacity(payload.nodes.len());

        for node in &payload.nodes {
            if vertices.contains_key(&node.id) {
                return Err(GraphError::DuplicateVertex {
                    id: node.id.clone(),
                });
            }
            let component = registry.resolve(&node.type_tag).ok_or_else(|| {
                GraphError::UnknownComponentType {
                    id: node.id.clone(),
                    type_tag: node.type_tag.clone(),
                }
            })?;
            let mut vertex = Vertex::new(node.id.clone(), node.type_tag.clone(), component);
            for (field, value) in &node.config {
                vertex
                    .set_config_input(field, value.clone())
                    .map_err(|source| GraphError::Config {
                        id: node.id.clone(),
                        source,
                    })?;
            }
            order.push(node.id.clone());
            vertices.insert(node.id.clone(), vertex);
        }

        let mut edges: Vec<Edge> = Vec::with_capacity(payload.edges.len());
        for descriptor in &payload.edges {
            let (Some(source), Some(target)) = (
                vertices.get(&descriptor.source_id),
                vertices.get(&descriptor.target_id),
            ) else {
                return Err(GraphError::DanglingEdge {
                    source_id: descriptor.source_id.clone(),
                    target_id: descriptor.target_id.clone(),
                });
            };
            edges.push(Edge::resolve(
                source,
                &descriptor.source_output,
                target,
                &descriptor.target_input,
            )?);
        }

        let loops = Self::resolve_cycles(&order, &vertices, &mut edges)?;

        let adjacency = Adjacency::from_edges(&edges, false);
        let layers = topology::layered_sort(&order, &adjacency.predecessors)
            .map_err(|vertices| GraphError::UnbreakableCycle { vertices })?;

        let mut edges_by_source: FxHashMap<VertexId, Vec<usize>> = FxHashMap::default();
        for (index, edge) in edges.iter().enumerate() {
            edges_by_source
                .entry(edge.source_id.clone())
                .or_default()
                .push(index);
        }

        debug!(
            vertices = order.len(),
            edges = edges.len(),
            loops = loops.len(),
            "graph resolved"
        );

        Ok(Self {
            vertices,
            order,
            edges,
            adjacency,
            layers,
            loops,
            edges_by_source,
        })
    }

    /// Find cyclic regions, check each is governed by exactly one loop
    /// vertex, and tag the edges re-entering that vertex as feedback.
    fn resolve_cycles(
        order: &[VertexId],
        vertices: &FxHashMap<VertexId, Vertex>,
        edges: &mut [Edge],
    ) -> Result<FxHashMap<VertexId, LoopRegion>, GraphError> {
        let full = Adjacency::from_edges(edges, true);
        let mut loops = FxHashMap::default();

        for members in topology::cyclic_components(order, &full.successors) {
            let member_set: FxHashSet<&VertexId> = members.iter().collect();
            let mut loop_ids = members
                .iter()
                .filter(|id| vertices.get(*id).is_some_and(|v| v.is_loop));
            let Some(loop_id) = loop_ids.next() else {
                return Err(GraphError::CycleWithoutLoop { vertices: members });
            };
            if loop_ids.next().is_some() {
                return Err(GraphError::NestedLoop { vertices: members });
            }
            let loop_id = loop_id.clone();

            let mut body_outputs = FxHashSet::default();
            for edge in edges.iter_mut() {
                let internal = member_set.contains(&edge.source_id)
                    && member_set.contains(&edge.target_id);
                if !internal {
                    continue;
                }
                if edge.target_id == loop_id {
                    edge.feedback = true;
                }
                if edge.source_id == loop_id {
                    body_outputs.insert(edge.source_output.clone());
                }
            }

            loops.insert(
                loop_id,
                LoopRegion {
                    members,
                    body_outputs,
                },
            );
        }
        Ok(loops)
    }

    #[must_use]
    pub fn vertex(&self, id: &str) -> Option<&Vertex> {
        self.vertices.get(id)
    }

    pub(crate) fn vertex_mut(&mut self, id: &str) -> Option<&mut Vertex> {
        self.vertices.get_mut(id)
    }

    /// Vertex ids in payload insertion order.
    #[must_use]
    pub fn vertex_ids(&self) -> &[VertexId] {
        &self.order
    }

    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Execution layers over non-feedback edges, insertion-order within a
    /// layer. Fixed at construction.
    #[must_use]
    pub fn layers(&self) -> &[Vec<VertexId>] {
        &self.layers
    }

    #[must_use]
    pub fn is_loop_vertex(&self, id: &str) -> bool {
        self.loops.contains_key(id)
    }

    pub(crate) fn adjacency(&self) -> &Adjacency {
        &self.adjacency
    }

    pub(crate) fn loop_region(&self, id: &str) -> Option<&LoopRegion> {
        self.loops.get(id)
    }

    pub(crate) fn edges_from(&self, id: &str) -> impl Iterator<Item = &Edge> {
        self.edges_by_source
            .get(id)
            .into_iter()
            .flatten()
            .map(|&index| &self.edges[index])
    }
}
