//! Warm-run behavior: repeated runs reuse cached builds, and edited inputs
//! miss the cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::json;

use flowgraph::cache::{CacheBackend, InMemoryCache};
use flowgraph::component::{
    BuildInputs, BuildOutput, Component, ComponentContext, ComponentError, InputSpec, OutputSpec,
    TypeRegistry,
};
use flowgraph::event_bus::{EventBody, EventManager, EventRecorder};
use flowgraph::graph::{EdgeDescriptor, Graph, GraphPayload, NodeDescriptor, RunOptions};
use flowgraph::run::{RunConfig, RunContext};
use flowgraph::types::ValueType;
use flowgraph::utils::testing::{TextSource, Uppercase};

fn registry() -> TypeRegistry {
    TypeRegistry::new()
        .register("text_source", TextSource)
        .register("uppercase", Uppercase)
}

/// Uppercases like [`Uppercase`] but counts how often `build` is invoked.
struct CountingUppercase {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Component for CountingUppercase {
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
        self.calls.fetch_add(1, Ordering::Relaxed);
        let text = inputs
            .get("input")
            .and_then(serde_json::Value::as_str)
            .ok_or(ComponentError::MissingInput { what: "input" })?;
        Ok(BuildOutput::new().with_result("output", json!(text.to_uppercase())))
    }
}

fn payload(text: &str) -> GraphPayload {
    GraphPayload::new()
        .with_node(NodeDescriptor::new("A", "text_source").with_config("text", json!(text)))
        .with_node(NodeDescriptor::new("B", "uppercase"))
        .with_edge(EdgeDescriptor::new("A", "text", "B", "input"))
}

fn cached_flags(recorder: &EventRecorder) -> Vec<(String, bool)> {
    recorder
        .snapshot()
        .iter()
        .filter_map(|e| match &e.body {
            EventBody::EndVertex {
                vertex_id, cached, ..
            } => Some((vertex_id.clone(), *cached)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn second_run_is_served_entirely_from_cache() {
    let mut graph = Graph::from_payload(&payload("hello"), &registry()).expect("valid payload");
    let config = RunConfig::default();
    let cache = InMemoryCache::new();

    let events = EventManager::new();
    let mut ctx = RunContext::new();
    let cold = graph
        .run(&mut ctx, RunOptions::new(&config, &events).with_cache(&cache))
        .await
        .expect("cold run");
    assert!(cold.is_success());
    assert!(cold.vertices.values().all(|v| !v.cached));
    assert_eq!(cache.len(), 2);

    let events = EventManager::new();
    let recorder = EventRecorder::new();
    events.register_observer(recorder.clone());
    let mut ctx = RunContext::new();
    let warm = graph
        .run(&mut ctx, RunOptions::new(&config, &events).with_cache(&cache))
        .await
        .expect("warm run");

    assert!(warm.is_success());
    assert!(warm.vertices.values().all(|v| v.cached));
    assert_eq!(
        cached_flags(&recorder),
        vec![("A".to_string(), true), ("B".to_string(), true)]
    );
    // Cached or not, the outputs are identical.
    assert_eq!(
        warm.vertex("B").and_then(|v| v.results.get("output")),
        cold.vertex("B").and_then(|v| v.results.get("output"))
    );
}

#[tokio::test]
async fn full_cache_hit_skips_component_invocation_entirely() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = TypeRegistry::new()
        .register("text_source", TextSource)
        .register(
            "uppercase",
            CountingUppercase {
                calls: Arc::clone(&calls),
            },
        );
    let mut graph = Graph::from_payload(&payload("hello"), &registry).expect("valid payload");
    let config = RunConfig::default();
    let cache = InMemoryCache::new();

    let events = EventManager::new();
    let mut ctx = RunContext::new();
    graph
        .run(&mut ctx, RunOptions::new(&config, &events).with_cache(&cache))
        .await
        .expect("cold run");
    assert_eq!(calls.load(Ordering::Relaxed), 1);

    let events = EventManager::new();
    let mut ctx = RunContext::new();
    let warm = graph
        .run(&mut ctx, RunOptions::new(&config, &events).with_cache(&cache))
        .await
        .expect("warm run");

    // No new invocation: the warm run was served from the cache.
    assert_eq!(calls.load(Ordering::Relaxed), 1);
    assert_eq!(
        warm.vertex("B").and_then(|v| v.results.get("output")),
        Some(&json!("HELLO"))
    );
}

#[tokio::test]
async fn changed_inputs_miss_the_cache() {
    let config = RunConfig::default();
    let cache = InMemoryCache::new();

    let mut graph = Graph::from_payload(&payload("hello"), &registry()).expect("valid payload");
    let events = EventManager::new();
    let mut ctx = RunContext::new();
    graph
        .run(&mut ctx, RunOptions::new(&config, &events).with_cache(&cache))
        .await
        .expect("first run");

    // Same ids, different configured text: fingerprints differ.
    let mut edited = Graph::from_payload(&payload("goodbye"), &registry()).expect("valid payload");
    let events = EventManager::new();
    let mut ctx = RunContext::new();
    let report = edited
        .run(&mut ctx, RunOptions::new(&config, &events).with_cache(&cache))
        .await
        .expect("second run");

    assert!(report.vertices.values().all(|v| !v.cached));
    assert_eq!(
        report.vertex("B").and_then(|v| v.results.get("output")),
        Some(&json!("GOODBYE"))
    );
    assert_eq!(cache.len(), 4);
}

#[tokio::test]
async fn invalidation_forces_a_rebuild_of_that_vertex_only() {
    let config = RunConfig::default();
    let cache = InMemoryCache::new();
    let mut graph = Graph::from_payload(&payload("hello"), &registry()).expect("valid payload");

    let events = EventManager::new();
    let mut ctx = RunContext::new();
    graph
        .run(&mut ctx, RunOptions::new(&config, &events).with_cache(&cache))
        .await
        .expect("cold run");

    cache.invalidate("A").await;

    let events = EventManager::new();
    let recorder = EventRecorder::new();
    events.register_observer(recorder.clone());
    let mut ctx = RunContext::new();
    let report = graph
        .run(&mut ctx, RunOptions::new(&config, &events).with_cache(&cache))
        .await
        .expect("second run");

    assert!(report.is_success());
    assert_eq!(report.vertex("A").map(|v| v.cached), Some(false));
    // A rebuilt to the same output, so B's fingerprint still matches.
    assert_eq!(report.vertex("B").map(|v| v.cached), Some(true));
}
