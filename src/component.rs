//! Component capability surface consumed by the engine.
//!
//! The engine never inspects component internals. Everything it needs is on
//! the [`Component`] trait: declared inputs and outputs, an async `build`,
//! and an optional loop marker. Concrete components live behind a
//! [`ComponentRegistry`] keyed by type tag, so graphs reference components
//! by name in the payload and the engine resolves them at construction.
//!
//! # Loop components
//!
//! A component that returns `true` from [`Component::loop_marker`] may sit
//! on a cycle. Each time it builds, the outputs it *actually emits* decide
//! what happens next: emitting the output that feeds the cycle body starts
//! another iteration, emitting the exit output ends the loop. Outputs absent
//! from the result map do not propagate.

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::types::{ValueType, VertexId};

/// Declared input field of a component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputSpec {
    /// Field name, unique within the component.
    pub name: String,
    /// Types this input accepts; an edge must resolve into this set.
    pub accepts: Vec<ValueType>,
    /// Required inputs must hold a value before the vertex may build.
    pub required: bool,
}

impl InputSpec {
    pub fn required(name: impl Into<String>, accepts: Vec<ValueType>) -> Self {
        Self {
            name: name.into(),
            accepts,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, accepts: Vec<ValueType>) -> Self {
        Self {
            name: name.into(),
            accepts,
            required: false,
        }
    }
}

/// Declared output field of a component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputSpec {
    /// Field name, unique within the component.
    pub name: String,
    /// Type of the value this output produces.
    pub produces: ValueType,
}

impl OutputSpec {
    pub fn new(name: impl Into<String>, produces: ValueType) -> Self {
        Self {
            name: name.into(),
            produces,
        }
    }
}

/// Validated input values handed to [`Component::build`], keyed by input name.
pub type BuildInputs = FxHashMap<String, Value>;

/// Values and side-channel artifacts produced by one component build.
///
/// Only the outputs present in `results` propagate along edges; a loop
/// component uses this to choose between iterating and exiting.
#[derive(Clone, Debug, Default)]
pub struct BuildOutput {
    /// Produced values keyed by declared output name.
    pub results: FxHashMap<String, Value>,
    /// Side-channel data (logs, token counts) that never flows along edges.
    pub artifacts: FxHashMap<String, Value>,
}

impl BuildOutput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_result(mut self, name: impl Into<String>, value: Value) -> Self {
        self.results.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn with_artifact(mut self, name: impl Into<String>, value: Value) -> Self {
        self.artifacts.insert(name.into(), value);
        self
    }
}

/// Per-build context passed to a component.
///
/// Carries the identity of the vertex being built and, for loop bodies, the
/// current iteration number (0 on the first pass).
#[derive(Clone, Debug)]
pub struct ComponentContext {
    pub vertex_id: VertexId,
    pub iteration: u32,
}

/// Errors a component may raise during build.
///
/// These are recoverable at the graph level: the vertex is marked `Error`,
/// its downstream branch goes `Inactive`, and unaffected branches continue.
#[derive(Debug, Error, Diagnostic)]
pub enum ComponentError {
    /// Expected input data was missing or malformed.
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(flowgraph::component::missing_input),
        help("Check that the upstream component produced the required field.")
    )]
    MissingInput { what: &'static str },

    /// External provider or service failure.
    #[error("provider error ({provider}): {message}")]
    #[diagnostic(code(flowgraph::component::provider))]
    Provider {
        provider: &'static str,
        message: String,
    },

    /// JSON serialization/deserialization failure inside the component.
    #[error(transparent)]
    #[diagnostic(code(flowgraph::component::serde_json))]
    Serde(#[from] serde_json::Error),

    /// Any other component-specific failure.
    #[error("build failed: {0}")]
    #[diagnostic(code(flowgraph::component::failed))]
    Failed(String),
}

impl ComponentError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Capability surface of one component type.
///
/// Implementations must be stateless with respect to the engine: all
/// per-run data arrives via `inputs` and `ctx`, and everything the engine
/// observes comes back in the [`BuildOutput`].
#[async_trait]
pub trait Component: Send + Sync {
    /// Declared input fields, in declaration order.
    fn inputs(&self) -> Vec<InputSpec>;

    /// Declared output fields, in declaration order.
    fn outputs(&self) -> Vec<OutputSpec>;

    /// Execute this component with validated inputs.
    async fn build(
        &self,
        inputs: BuildInputs,
        ctx: ComponentContext,
    ) -> Result<BuildOutput, ComponentError>;

    /// Whether this component starts/advances a loop.
    ///
    /// Loop components are the only legal way to close a cycle in a graph.
    fn loop_marker(&self) -> bool {
        false
    }
}

/// Resolves payload type tags to component implementations.
pub trait ComponentRegistry: Send + Sync {
    /// Look up a component by its type tag.
    fn resolve(&self, type_tag: &str) -> Option<Arc<dyn Component>>;
}

/// Map-backed registry, the standard [`ComponentRegistry`] implementation.
#[derive(Default)]
pub struct TypeRegistry {
    entries: FxHashMap<String, Arc<dyn Component>>,
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component under a type tag, replacing any previous entry.
    #[must_use]
    pub fn register(mut self, type_tag: impl Into<String>, component: impl Component + 'static) -> Self {
        self.entries.insert(type_tag.into(), Arc::new(component));
        self
    }

    /// Number of registered component types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ComponentRegistry for TypeRegistry {
    fn resolve(&self, type_tag: &str) -> Option<Arc<dyn Component>> {
        self.entries.get(type_tag).cloned()
    }
}
