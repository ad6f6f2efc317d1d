//! Typed directed connections between vertex outputs and inputs.
//!
//! Edges are resolved once at graph construction and immutable afterwards.
//! Resolution intersects the source output's produced type with the target
//! input's accepted set; an empty intersection rejects the edge before any
//! vertex executes. At run time edges are pure data used for dependency
//! derivation and value propagation.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ValueType, VertexId};
use crate::vertex::Vertex;

/// Why an edge failed to resolve against its endpoint declarations.
#[derive(Debug, Error, Diagnostic)]
pub enum EdgeError {
    #[error("source vertex {vertex} declares no output `{field}`")]
    #[diagnostic(code(flowgraph::edge::unknown_source_output))]
    UnknownSourceOutput { vertex: VertexId, field: String },

    #[error("target vertex {vertex} declares no input `{field}`")]
    #[diagnostic(code(flowgraph::edge::unknown_target_input))]
    UnknownTargetInput { vertex: VertexId, field: String },

    #[error(
        "output `{source_output}` of {source_id} produces {produces}, \
         but input `{target_input}` of {target_id} accepts {accepts:?}"
    )]
    #[diagnostic(
        code(flowgraph::edge::incompatible_types),
        help("Connect an output whose type is in the input's accepted set.")
    )]
    IncompatibleTypes {
        source_id: VertexId,
        source_output: String,
        produces: ValueType,
        target_id: VertexId,
        target_input: String,
        accepts: Vec<ValueType>,
    },
}

/// A resolved, immutable connection from one vertex's output to another's input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source_id: VertexId,
    pub source_output: String,
    pub target_id: VertexId,
    pub target_input: String,
    /// Intersection of the source output type and the target accepted set.
    pub resolved_type: ValueType,
    /// Feedback edges close a loop cycle and are excluded from the static sort.
    pub feedback: bool,
}

impl Edge {
    /// Resolve an edge against its endpoints' declared interfaces.
    pub fn resolve(
        source: &Vertex,
        source_output: &str,
        target: &Vertex,
        target_input: &str,
    ) -> Result<Self, EdgeError> {
        let out_spec =
            source
                .output_spec(source_output)
                .ok_or_else(|| EdgeError::UnknownSourceOutput {
                    vertex: source.id.clone(),
                    field: source_output.to_string(),
                })?;
        let in_spec = target
            .input_spec(target_input)
            .ok_or_else(|| EdgeError::UnknownTargetInput {
                vertex: target.id.clone(),
                field: target_input.to_string(),
            })?;

        let produces = out_spec.produces;
        let compatible = in_spec
            .accepts
            .iter()
            .any(|accepted| accepted.accepts(produces));
        if !compatible {
            return Err(EdgeError::IncompatibleTypes {
                source_id: source.id.clone(),
                source_output: source_output.to_string(),
                produces,
                target_id: target.id.clone(),
                target_input: target_input.to_string(),
                accepts: in_spec.accepts.clone(),
            });
        }

        // The most specific of the two endpoint types wins; `Any` defers.
        let resolved_type = if produces == ValueType::Any {
            in_spec
                .accepts
                .iter()
                .copied()
                .find(|t| *t != ValueType::Any)
                .unwrap_or(ValueType::Any)
        } else {
            produces
        };

        Ok(Self {
            source_id: source.id.clone(),
            source_output: source_output.to_string(),
            target_id: target.id.clone(),
            target_input: target_input.to_string(),
            resolved_type,
            feedback: false,
        })
    }
}
