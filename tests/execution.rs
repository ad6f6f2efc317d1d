//! End-to-end runs over small graphs: event ordering, failure isolation,
//! and cooperative cancellation.

use async_trait::async_trait;
use serde_json::json;

use flowgraph::component::{
    BuildInputs, BuildOutput, Component, ComponentContext, ComponentError, InputSpec, OutputSpec,
    TypeRegistry,
};
use flowgraph::event_bus::{EventBody, EventManager, EventRecorder, RunOutcome};
use flowgraph::graph::{EdgeDescriptor, Graph, GraphPayload, NodeDescriptor, RunOptions};
use flowgraph::run::{CancellationHandle, RunConfig, RunContext};
use flowgraph::types::{BuildStatus, ValueType};
use flowgraph::utils::testing::{AlwaysFails, Concat, Probe, TextSource, Uppercase};

fn registry() -> TypeRegistry {
    TypeRegistry::new()
        .register("text_source", TextSource)
        .register("uppercase", Uppercase)
        .register("always_fails", AlwaysFails)
        .register("concat", Concat)
        .register("probe", Probe)
}

fn linear_graph() -> Graph {
    let payload = GraphPayload::new()
        .with_node(NodeDescriptor::new("A", "text_source").with_config("text", json!("hello")))
        .with_node(NodeDescriptor::new("B", "uppercase"))
        .with_node(NodeDescriptor::new("C", "uppercase"))
        .with_edge(EdgeDescriptor::new("A", "text", "B", "input"))
        .with_edge(EdgeDescriptor::new("B", "output", "C", "input"));
    Graph::from_payload(&payload, &registry()).expect("valid payload")
}

fn kinds(recorder: &EventRecorder) -> Vec<(String, Option<String>)> {
    recorder
        .snapshot()
        .iter()
        .map(|e| {
            (
                e.body.kind().to_string(),
                e.body.vertex_id().map(str::to_string),
            )
        })
        .collect()
}

#[tokio::test]
async fn linear_graph_builds_in_order_with_full_event_stream() {
    let mut graph = linear_graph();
    let config = RunConfig::default();
    let events = EventManager::new();
    let recorder = EventRecorder::new();
    events.register_observer(recorder.clone());

    let mut ctx = RunContext::new();
    let report = graph
        .run(&mut ctx, RunOptions::new(&config, &events))
        .await
        .expect("run succeeds");

    assert!(report.is_success());
    assert_eq!(
        report.vertex("C").and_then(|v| v.results.get("output")),
        Some(&json!("HELLO"))
    );

    let observed = kinds(&recorder);
    let expected = vec![
        ("vertices_sorted".to_string(), None),
        ("build_start".to_string(), Some("A".to_string())),
        ("end_vertex".to_string(), Some("A".to_string())),
        ("build_end".to_string(), Some("A".to_string())),
        ("build_start".to_string(), Some("B".to_string())),
        ("end_vertex".to_string(), Some("B".to_string())),
        ("build_end".to_string(), Some("B".to_string())),
        ("build_start".to_string(), Some("C".to_string())),
        ("end_vertex".to_string(), Some("C".to_string())),
        ("build_end".to_string(), Some("C".to_string())),
        ("end".to_string(), None),
    ];
    assert_eq!(observed, expected);

    // Sequences are contiguous and match emission order.
    let sequences: Vec<u64> = recorder.snapshot().iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, (0..11).collect::<Vec<u64>>());
}

#[tokio::test]
async fn sorted_event_carries_order_and_first_layer() {
    let mut graph = linear_graph();
    let config = RunConfig::default();
    let events = EventManager::new();
    let recorder = EventRecorder::new();
    events.register_observer(recorder.clone());

    let mut ctx = RunContext::new();
    graph
        .run(&mut ctx, RunOptions::new(&config, &events))
        .await
        .expect("run succeeds");

    let snapshot = recorder.snapshot();
    let EventBody::VerticesSorted { ids, to_run } = &snapshot[0].body else {
        panic!("first event must be vertices_sorted");
    };
    assert_eq!(ids, &["A".to_string(), "B".to_string(), "C".to_string()]);
    assert_eq!(to_run, &["A".to_string()]);
}

#[tokio::test]
async fn joins_wait_for_both_branches_and_artifacts_reach_the_report() {
    // A fans out to B and straight into J; J joins both branches, P taps it.
    let payload = GraphPayload::new()
        .with_node(NodeDescriptor::new("A", "text_source").with_config("text", json!("hello")))
        .with_node(NodeDescriptor::new("B", "uppercase"))
        .with_node(NodeDescriptor::new("J", "concat"))
        .with_node(NodeDescriptor::new("P", "probe"))
        .with_edge(EdgeDescriptor::new("A", "text", "B", "input"))
        .with_edge(EdgeDescriptor::new("A", "text", "J", "left"))
        .with_edge(EdgeDescriptor::new("B", "output", "J", "right"))
        .with_edge(EdgeDescriptor::new("J", "joined", "P", "input"));
    let mut graph = Graph::from_payload(&payload, &registry()).expect("valid payload");

    let config = RunConfig::default();
    let events = EventManager::new();
    let mut ctx = RunContext::new();
    let report = graph
        .run(&mut ctx, RunOptions::new(&config, &events))
        .await
        .expect("run succeeds");

    assert!(report.is_success());
    assert_eq!(
        report.vertex("J").and_then(|v| v.results.get("joined")),
        Some(&json!("hello HELLO"))
    );
    assert_eq!(
        report.vertex("P").and_then(|v| v.results.get("output")),
        Some(&json!("hello HELLO"))
    );
    assert_eq!(
        report.vertex("P").and_then(|v| v.artifacts.get("iteration")),
        Some(&json!(0))
    );
}

#[tokio::test]
async fn failure_deactivates_downstream_but_spares_siblings() {
    // A feeds both a failing branch (B -> C) and a healthy one (D).
    let payload = GraphPayload::new()
        .with_node(NodeDescriptor::new("A", "text_source").with_config("text", json!("hi")))
        .with_node(NodeDescriptor::new("B", "always_fails"))
        .with_node(NodeDescriptor::new("C", "uppercase"))
        .with_node(NodeDescriptor::new("D", "uppercase"))
        .with_edge(EdgeDescriptor::new("A", "text", "B", "input"))
        .with_edge(EdgeDescriptor::new("B", "output", "C", "input"))
        .with_edge(EdgeDescriptor::new("A", "text", "D", "input"));
    let mut graph = Graph::from_payload(&payload, &registry()).expect("valid payload");

    let config = RunConfig::default();
    let events = EventManager::new();
    let recorder = EventRecorder::new();
    events.register_observer(recorder.clone());

    let mut ctx = RunContext::new();
    let report = graph
        .run(&mut ctx, RunOptions::new(&config, &events))
        .await
        .expect("run completes despite the failure");

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert!(!report.is_success());
    assert_eq!(report.vertex("B").map(|v| v.status), Some(BuildStatus::Error));
    assert!(
        report
            .vertex("B")
            .and_then(|v| v.error.as_deref())
            .is_some_and(|msg| msg.contains("always fails"))
    );
    assert_eq!(
        report.vertex("C").map(|v| v.status),
        Some(BuildStatus::Inactive)
    );
    assert_eq!(report.vertex("D").map(|v| v.status), Some(BuildStatus::Built));
    assert_eq!(
        report.vertex("D").and_then(|v| v.results.get("output")),
        Some(&json!("HI"))
    );

    // The stream carries the error attribution.
    assert!(recorder.snapshot().iter().any(|e| matches!(
        &e.body,
        EventBody::Error { vertex_id: Some(id), .. } if id == "B"
    )));
    let statuses = EventRecorder::terminal_statuses(&recorder.snapshot());
    assert_eq!(statuses["C"], BuildStatus::Inactive);
}

#[tokio::test]
async fn cancellation_before_the_first_wave_builds_nothing() {
    let mut graph = linear_graph();
    let config = RunConfig::default();
    let events = EventManager::new();
    let recorder = EventRecorder::new();
    events.register_observer(recorder.clone());

    let mut ctx = RunContext::new();
    ctx.cancellation_handle().cancel();
    let report = graph
        .run(&mut ctx, RunOptions::new(&config, &events))
        .await
        .expect("cancelled run still reports");

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    for id in ["A", "B", "C"] {
        assert_eq!(
            report.vertex(id).map(|v| v.status),
            Some(BuildStatus::ToBuild)
        );
    }
    let observed = kinds(&recorder);
    assert_eq!(
        observed,
        vec![
            ("vertices_sorted".to_string(), None),
            ("end".to_string(), None),
        ]
    );
}

/// Cancels the shared handle as a side effect of building.
struct CancelOnBuild {
    handle: CancellationHandle,
}

#[async_trait]
impl Component for CancelOnBuild {
    fn inputs(&self) -> Vec<InputSpec> {
        vec![InputSpec::required("input", vec![ValueType::Any])]
    }

    fn outputs(&self) -> Vec<OutputSpec> {
        vec![OutputSpec::new("output", ValueType::Any)]
    }

    async fn build(
        &self,
        inputs: BuildInputs,
        _ctx: ComponentContext,
    ) -> Result<BuildOutput, ComponentError> {
        self.handle.cancel();
        let value = inputs
            .get("input")
            .cloned()
            .ok_or(ComponentError::MissingInput { what: "input" })?;
        Ok(BuildOutput::new().with_result("output", value))
    }
}

#[tokio::test]
async fn cancellation_mid_run_stops_at_the_next_wave_boundary() {
    let mut ctx = RunContext::new();
    let registry = TypeRegistry::new()
        .register("text_source", TextSource)
        .register("uppercase", Uppercase)
        .register(
            "cancel_on_build",
            CancelOnBuild {
                handle: ctx.cancellation_handle(),
            },
        );
    let payload = GraphPayload::new()
        .with_node(NodeDescriptor::new("A", "text_source").with_config("text", json!("hi")))
        .with_node(NodeDescriptor::new("B", "cancel_on_build"))
        .with_node(NodeDescriptor::new("C", "uppercase"))
        .with_edge(EdgeDescriptor::new("A", "text", "B", "input"))
        .with_edge(EdgeDescriptor::new("B", "output", "C", "input"));
    let mut graph = Graph::from_payload(&payload, &registry).expect("valid payload");

    let config = RunConfig::default();
    let events = EventManager::new();
    let report = graph
        .run(&mut ctx, RunOptions::new(&config, &events))
        .await
        .expect("cancelled run still reports");

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    // B finished its wave; C never started.
    assert_eq!(report.vertex("B").map(|v| v.status), Some(BuildStatus::Built));
    assert_eq!(
        report.vertex("C").map(|v| v.status),
        Some(BuildStatus::ToBuild)
    );
}

#[tokio::test]
async fn missing_required_inputs_fail_the_vertex_at_its_turn() {
    // B's input is never configured or fed by an edge.
    let payload = GraphPayload::new()
        .with_node(NodeDescriptor::new("A", "text_source").with_config("text", json!("hi")))
        .with_node(NodeDescriptor::new("B", "uppercase"));
    let mut graph = Graph::from_payload(&payload, &registry()).expect("valid payload");

    let config = RunConfig::default();
    let events = EventManager::new();
    let mut ctx = RunContext::new();
    let report = graph
        .run(&mut ctx, RunOptions::new(&config, &events))
        .await
        .expect("run completes");

    assert_eq!(report.vertex("A").map(|v| v.status), Some(BuildStatus::Built));
    assert_eq!(report.vertex("B").map(|v| v.status), Some(BuildStatus::Error));
}
