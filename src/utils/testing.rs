//! Small ready-made components for tests and demos.
//!
//! None of these talk to external services; they exist so a realistic
//! graph can be assembled in a few lines.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::component::{
    BuildInputs, BuildOutput, Component, ComponentContext, ComponentError, InputSpec, OutputSpec,
};
use crate::types::ValueType;

fn text_input<'a>(inputs: &'a BuildInputs, name: &'static str) -> Result<&'a str, ComponentError> {
    inputs
        .get(name)
        .and_then(Value::as_str)
        .ok_or(ComponentError::MissingInput { what: name })
}

/// Emits its configured `text` field on the `text` output.
pub struct TextSource;

#[async_trait]
impl Component for TextSource {
    fn inputs(&self) -> Vec<InputSpec> {
        vec![InputSpec::required("text", vec![ValueType::Text])]
    }

    fn outputs(&self) -> Vec<OutputSpec> {
        vec![OutputSpec::new("text", ValueType::Text)]
    }

    async fn build(
        &self,
        inputs: BuildInputs,
        _ctx: ComponentContext,
    ) -> Result<BuildOutput, ComponentError> {
        let text = text_input(&inputs, "text")?;
        Ok(BuildOutput::new().with_result("text", json!(text)))
    }
}

/// Uppercases its `input` onto its `output`.
pub struct Uppercase;

#[async_trait]
impl Component for Uppercase {
    fn inputs(&self) -> Vec<InputSpec> {
        vec![InputSpec::required("input", vec![ValueType::Text])]
    }

    fn outputs(&self) -> Vec<OutputSpec> {
        vec![OutputSpec::new("output", ValueType::Text)]
    }

    async fn build(
        &self,
        inputs: BuildInputs,
        _ctx: ComponentContext,
    ) -> Result<BuildOutput, ComponentError> {
        let text = text_input(&inputs, "input")?;
        Ok(BuildOutput::new().with_result("output", json!(text.to_uppercase())))
    }
}

/// Joins `left` and `right` with a space.
pub struct Concat;

#[async_trait]
impl Component for Concat {
    fn inputs(&self) -> Vec<InputSpec> {
        vec![
            InputSpec::required("left", vec![ValueType::Text]),
            InputSpec::required("right", vec![ValueType::Text]),
        ]
    }

    fn outputs(&self) -> Vec<OutputSpec> {
        vec![OutputSpec::new("joined", ValueType::Text)]
    }

    async fn build(
        &self,
        inputs: BuildInputs,
        _ctx: ComponentContext,
    ) -> Result<BuildOutput, ComponentError> {
        let left = text_input(&inputs, "left")?;
        let right = text_input(&inputs, "right")?;
        Ok(BuildOutput::new().with_result("joined", json!(format!("{left} {right}"))))
    }
}

/// Fails every build with a fixed message.
pub struct AlwaysFails;

#[async_trait]
impl Component for AlwaysFails {
    fn inputs(&self) -> Vec<InputSpec> {
        vec![InputSpec::optional("input", vec![ValueType::Any])]
    }

    fn outputs(&self) -> Vec<OutputSpec> {
        vec![OutputSpec::new("output", ValueType::Any)]
    }

    async fn build(
        &self,
        _inputs: BuildInputs,
        ctx: ComponentContext,
    ) -> Result<BuildOutput, ComponentError> {
        Err(ComponentError::failed(format!(
            "{} always fails",
            ctx.vertex_id
        )))
    }
}

/// Loop component that runs its body a fixed number of times.
///
/// While the completed iteration count is below `rounds`, the build
/// produces `item` (the body output); afterwards it produces `done` with
/// the collected feedback values. The `feedback` input is optional because
/// it only holds a value once the body has run.
pub struct CountedLoop {
    pub rounds: u32,
}

#[async_trait]
impl Component for CountedLoop {
    fn inputs(&self) -> Vec<InputSpec> {
        vec![
            InputSpec::required("seed", vec![ValueType::Text]),
            InputSpec::optional("feedback", vec![ValueType::Any]),
        ]
    }

    fn outputs(&self) -> Vec<OutputSpec> {
        vec![
            OutputSpec::new("item", ValueType::Text),
            OutputSpec::new("done", ValueType::Text),
        ]
    }

    async fn build(
        &self,
        inputs: BuildInputs,
        ctx: ComponentContext,
    ) -> Result<BuildOutput, ComponentError> {
        let seed = text_input(&inputs, "seed")?;
        if ctx.iteration < self.rounds {
            Ok(BuildOutput::new().with_result("item", json!(format!("{seed}#{}", ctx.iteration))))
        } else {
            let last = inputs
                .get("feedback")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Ok(BuildOutput::new().with_result("done", json!(format!("done after {last}"))))
        }
    }

    fn loop_marker(&self) -> bool {
        true
    }
}

/// Loop component that never produces its exit output. Exists to exercise
/// the iteration cap.
pub struct EndlessLoop;

#[async_trait]
impl Component for EndlessLoop {
    fn inputs(&self) -> Vec<InputSpec> {
        vec![
            InputSpec::required("seed", vec![ValueType::Text]),
            InputSpec::optional("feedback", vec![ValueType::Any]),
        ]
    }

    fn outputs(&self) -> Vec<OutputSpec> {
        vec![
            OutputSpec::new("item", ValueType::Text),
            OutputSpec::new("done", ValueType::Text),
        ]
    }

    async fn build(
        &self,
        inputs: BuildInputs,
        _ctx: ComponentContext,
    ) -> Result<BuildOutput, ComponentError> {
        let seed = text_input(&inputs, "seed")?;
        Ok(BuildOutput::new().with_result("item", json!(seed)))
    }

    fn loop_marker(&self) -> bool {
        true
    }
}

/// Passes its input through and reports the iteration it ran in as an
/// artifact.
pub struct Probe;

#[async_trait]
impl Component for Probe {
    fn inputs(&self) -> Vec<InputSpec> {
        vec![InputSpec::required("input", vec![ValueType::Any])]
    }

    fn outputs(&self) -> Vec<OutputSpec> {
        vec![OutputSpec::new("output", ValueType::Any)]
    }

    async fn build(
        &self,
        inputs: BuildInputs,
        ctx: ComponentContext,
    ) -> Result<BuildOutput, ComponentError> {
        let value = inputs
            .get("input")
            .cloned()
            .ok_or(ComponentError::MissingInput { what: "input" })?;
        Ok(BuildOutput::new()
            .with_result("output", value)
            .with_artifact("iteration", json!(ctx.iteration)))
    }
}
