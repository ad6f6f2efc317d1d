//! Vertex: one component instance plus its build state.
//!
//! A vertex owns the declared input/output specs of its component, the
//! values propagated into its input slots, and the bookkeeping the run loop
//! mutates (status, duration, error, results). The component itself stays
//! behind an `Arc<dyn Component>` so concurrent builds within a layer can
//! run without borrowing the vertex mutably.

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::component::{BuildInputs, Component, InputSpec, OutputSpec};
use crate::types::{BuildStatus, ValueType, VertexId};

/// Errors raised by vertex-local state transitions.
///
/// Unlike component failures, these indicate the engine (or a payload that
/// slipped past construction-time validation) asked a vertex to do
/// something its declared interface does not allow.
#[derive(Debug, Error, Diagnostic)]
pub enum VertexError {
    /// A value was propagated into an input name the component never declared.
    #[error("vertex {vertex}: unknown input field `{field}`")]
    #[diagnostic(code(flowgraph::vertex::unknown_input))]
    UnknownInput { vertex: VertexId, field: String },

    /// An output name was requested that the component never declared.
    #[error("vertex {vertex}: unknown output field `{field}`")]
    #[diagnostic(code(flowgraph::vertex::unknown_output))]
    UnknownOutput { vertex: VertexId, field: String },

    /// The vertex was asked to build without all required inputs satisfied.
    ///
    /// The scheduler must never do this; hitting it is an engine bug.
    #[error("vertex {vertex}: build requested with unsatisfied inputs: {missing:?}")]
    #[diagnostic(
        code(flowgraph::vertex::invalid_build_state),
        help("The run manager scheduled this vertex before its dependencies completed.")
    )]
    InvalidBuildState {
        vertex: VertexId,
        missing: Vec<String>,
    },
}

/// One component instance inside a graph.
pub struct Vertex {
    /// Unique id within the owning graph.
    pub id: VertexId,
    /// Component type tag from the payload.
    pub type_tag: String,
    /// Declared inputs, in declaration order.
    pub inputs: Vec<InputSpec>,
    /// Declared outputs, in declaration order.
    pub outputs: Vec<OutputSpec>,
    /// Whether the component carries the loop marker.
    pub is_loop: bool,
    /// Current lifecycle state.
    pub status: BuildStatus,
    /// Wall time of the last build, if any.
    pub duration: Option<Duration>,
    /// Message of the last build failure, if any.
    pub error: Option<String>,
    /// Output values from the last successful build.
    pub results: FxHashMap<String, Value>,
    /// Side-channel artifacts from the last successful build.
    pub artifacts: FxHashMap<String, Value>,
    component: Arc<dyn Component>,
    input_values: FxHashMap<String, Value>,
    /// Input names whose values come from payload config rather than edges.
    config_inputs: FxHashSet<String>,
}

impl Vertex {
    /// Wrap a resolved component instance.
    pub fn new(id: VertexId, type_tag: String, component: Arc<dyn Component>) -> Self {
        let inputs = component.inputs();
        let outputs = component.outputs();
        let is_loop = component.loop_marker();
        Self {
            id,
            type_tag,
            inputs,
            outputs,
            is_loop,
            status: BuildStatus::ToBuild,
            duration: None,
            error: None,
            results: FxHashMap::default(),
            artifacts: FxHashMap::default(),
            component,
            input_values: FxHashMap::default(),
            config_inputs: FxHashSet::default(),
        }
    }

    /// Handle to the wrapped component for a concurrent build.
    #[must_use]
    pub fn component(&self) -> Arc<dyn Component> {
        Arc::clone(&self.component)
    }

    /// Look up a declared input spec by name.
    #[must_use]
    pub fn input_spec(&self, name: &str) -> Option<&InputSpec> {
        self.inputs.iter().find(|spec| spec.name == name)
    }

    /// Look up a declared output spec by name.
    #[must_use]
    pub fn output_spec(&self, name: &str) -> Option<&OutputSpec> {
        self.outputs.iter().find(|spec| spec.name == name)
    }

    /// Assign a propagated value to an input slot.
    ///
    /// Edge-level type compatibility was already resolved at construction,
    /// so this only rejects names the component never declared.
    pub fn set_input(&mut self, name: &str, value: Value) -> Result<(), VertexError> {
        if self.input_spec(name).is_none() {
            return Err(VertexError::UnknownInput {
                vertex: self.id.clone(),
                field: name.to_string(),
            });
        }
        self.input_values.insert(name.to_string(), value);
        Ok(())
    }

    /// Assign a static config value to an input slot.
    ///
    /// Config slots survive [`Vertex::reset_for_run`]; propagated slots do
    /// not.
    pub fn set_config_input(&mut self, name: &str, value: Value) -> Result<(), VertexError> {
        self.set_input(name, value)?;
        self.config_inputs.insert(name.to_string());
        Ok(())
    }

    /// Current value of an input slot, if assigned.
    #[must_use]
    pub fn input_value(&self, name: &str) -> Option<&Value> {
        self.input_values.get(name)
    }

    /// Required inputs that do not yet hold a type-valid value.
    #[must_use]
    pub fn missing_inputs(&self) -> Vec<String> {
        self.inputs
            .iter()
            .filter(|spec| spec.required)
            .filter(|spec| match self.input_values.get(&spec.name) {
                None => true,
                Some(value) => {
                    let got = ValueType::of(value);
                    !spec.accepts.iter().any(|accepted| accepted.accepts(got))
                }
            })
            .map(|spec| spec.name.clone())
            .collect()
    }

    /// Whether every required input holds a value satisfying its type set.
    #[must_use]
    pub fn ready_to_build(&self) -> bool {
        self.missing_inputs().is_empty()
    }

    /// Snapshot the input slots for a build, enforcing readiness.
    pub fn take_build_inputs(&self) -> Result<BuildInputs, VertexError> {
        let missing = self.missing_inputs();
        if !missing.is_empty() {
            return Err(VertexError::InvalidBuildState {
                vertex: self.id.clone(),
                missing,
            });
        }
        Ok(self.input_values.clone())
    }

    /// Value of one declared output from the last build, if produced.
    #[must_use]
    pub fn result(&self, output_name: &str) -> Option<&Value> {
        self.results.get(output_name)
    }

    /// Record a successful build.
    pub fn record_success(
        &mut self,
        results: FxHashMap<String, Value>,
        artifacts: FxHashMap<String, Value>,
        duration: Duration,
    ) {
        self.results = results;
        self.artifacts = artifacts;
        self.duration = Some(duration);
        self.error = None;
        self.status = BuildStatus::Built;
    }

    /// Record a failed build.
    pub fn record_failure(&mut self, message: String, duration: Duration) {
        self.error = Some(message);
        self.duration = Some(duration);
        self.status = BuildStatus::Error;
    }

    /// Reset run bookkeeping ahead of the next loop iteration.
    ///
    /// Input slots keep their values: the iteration's propagation already
    /// happened and must not be wiped.
    pub fn reset_for_iteration(&mut self) {
        self.status = BuildStatus::ToBuild;
        self.duration = None;
        self.error = None;
        self.results.clear();
        self.artifacts.clear();
    }

    /// Reset the vertex ahead of a fresh run.
    ///
    /// Static payload config stays in place; values propagated by an
    /// earlier run are dropped so they cannot leak into this one.
    pub fn reset_for_run(&mut self) {
        self.reset_for_iteration();
        let config = &self.config_inputs;
        self.input_values.retain(|name, _| config.contains(name));
    }
}

impl std::fmt::Debug for Vertex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vertex")
            .field("id", &self.id)
            .field("type_tag", &self.type_tag)
            .field("status", &self.status)
            .field("is_loop", &self.is_loop)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{BuildOutput, ComponentContext, ComponentError};
    use async_trait::async_trait;
    use serde_json::json;

    struct Concat;

    #[async_trait]
    impl Component for Concat {
        fn inputs(&self) -> Vec<InputSpec> {
            vec![
                InputSpec::required("left", vec![ValueType::Text]),
                InputSpec::required("right", vec![ValueType::Text]),
                InputSpec::optional("separator", vec![ValueType::Text]),
            ]
        }

        fn outputs(&self) -> Vec<OutputSpec> {
            vec![OutputSpec::new("joined", ValueType::Text)]
        }

        async fn build(
            &self,
            _inputs: BuildInputs,
            _ctx: ComponentContext,
        ) -> Result<BuildOutput, ComponentError> {
            Ok(BuildOutput::new())
        }
    }

    fn concat_vertex() -> Vertex {
        Vertex::new("c-1".to_string(), "concat".to_string(), Arc::new(Concat))
    }

    #[test]
    fn missing_inputs_tracks_required_fields_only() {
        let mut v = concat_vertex();
        assert_eq!(v.missing_inputs(), vec!["left", "right"]);

        v.set_input("left", json!("a")).unwrap();
        assert_eq!(v.missing_inputs(), vec!["right"]);

        v.set_input("right", json!("b")).unwrap();
        assert!(v.ready_to_build());
    }

    #[test]
    fn type_invalid_value_keeps_input_unsatisfied() {
        let mut v = concat_vertex();
        v.set_input("left", json!(42)).unwrap();
        v.set_input("right", json!("ok")).unwrap();
        assert_eq!(v.missing_inputs(), vec!["left"]);
        assert!(!v.ready_to_build());
    }

    #[test]
    fn unknown_input_is_rejected() {
        let mut v = concat_vertex();
        let err = v.set_input("nope", json!(1)).unwrap_err();
        assert!(matches!(err, VertexError::UnknownInput { .. }));
    }

    #[test]
    fn build_inputs_require_readiness() {
        let v = concat_vertex();
        let err = v.take_build_inputs().unwrap_err();
        match err {
            VertexError::InvalidBuildState { missing, .. } => {
                assert_eq!(missing, vec!["left", "right"]);
            }
            other => panic!("expected InvalidBuildState, got {other:?}"),
        }
    }

    #[test]
    fn iteration_reset_keeps_input_slots() {
        let mut v = concat_vertex();
        v.set_input("left", json!("a")).unwrap();
        v.set_input("right", json!("b")).unwrap();
        v.record_success(FxHashMap::default(), FxHashMap::default(), Duration::ZERO);
        assert_eq!(v.status, BuildStatus::Built);

        v.reset_for_iteration();
        assert_eq!(v.status, BuildStatus::ToBuild);
        assert!(v.ready_to_build());
        assert!(v.results.is_empty());
    }

    #[test]
    fn run_reset_keeps_config_and_drops_propagated_inputs() {
        let mut v = concat_vertex();
        v.set_config_input("left", json!("a")).unwrap();
        v.set_input("right", json!("b")).unwrap();
        v.record_success(FxHashMap::default(), FxHashMap::default(), Duration::ZERO);

        v.reset_for_run();
        assert_eq!(v.status, BuildStatus::ToBuild);
        assert_eq!(v.input_value("left"), Some(&json!("a")));
        assert_eq!(v.input_value("right"), None);
        assert_eq!(v.missing_inputs(), vec!["right"]);
    }
}
