//! Core identifier and value types shared across the engine.
//!
//! This module defines the small vocabulary the rest of the crate speaks:
//! vertex identifiers, build lifecycle states, and the value-type lattice
//! used to validate edges at graph construction time.
//!
//! # Key Types
//!
//! - [`VertexId`]: stable string identifier for a vertex within one graph
//! - [`BuildStatus`]: the lifecycle state of a vertex during a run
//! - [`ValueType`]: the closed set of wire types an edge can carry

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifier of a vertex within a graph.
///
/// Ids come from the external payload and must be unique per graph; the
/// engine treats them as opaque strings.
pub type VertexId = String;

/// Lifecycle state of a vertex during one run.
///
/// Transitions are driven exclusively by the run loop:
/// `ToBuild → Building → {Built | Error}`, with the extra edge
/// `ToBuild → Inactive` for a vertex whose upstream branch failed and which
/// therefore never builds. `Inactive` is itself observable: downstream
/// consumers can distinguish "never ran" from "ran and failed".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    /// Scheduled for this run but not started yet.
    ToBuild,
    /// Currently executing its component.
    Building,
    /// Finished successfully; results are available.
    Built,
    /// The component raised during build; the error is recorded on the vertex.
    Error,
    /// Skipped because an upstream dependency failed.
    Inactive,
}

impl BuildStatus {
    /// Terminal states never change again within a run iteration.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Built | Self::Error | Self::Inactive)
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ToBuild => "to_build",
            Self::Building => "building",
            Self::Built => "built",
            Self::Error => "error",
            Self::Inactive => "inactive",
        };
        write!(f, "{label}")
    }
}

/// Closed set of value types carried along edges.
///
/// `Any` is the top of the lattice: it accepts and is accepted by every
/// other type. Everything else matches only itself. The intersection of a
/// source output type and a target's accepted set is resolved once, at
/// graph construction; a mismatch rejects the edge before any vertex runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Any,
    Text,
    Number,
    Bool,
    Object,
    List,
}

impl ValueType {
    /// Whether a value of type `other` can flow into a slot of this type.
    #[must_use]
    pub fn accepts(&self, other: ValueType) -> bool {
        matches!(self, Self::Any) || matches!(other, ValueType::Any) || *self == other
    }

    /// Classify a JSON value into the engine's type lattice.
    #[must_use]
    pub fn of(value: &Value) -> ValueType {
        match value {
            Value::String(_) => Self::Text,
            Value::Number(_) => Self::Number,
            Value::Bool(_) => Self::Bool,
            Value::Object(_) => Self::Object,
            Value::Array(_) => Self::List,
            Value::Null => Self::Any,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Any => "any",
            Self::Text => "text",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Object => "object",
            Self::List => "list",
        };
        write!(f, "{label}")
    }
}
