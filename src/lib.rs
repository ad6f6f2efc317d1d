//! # Flowgraph: Typed Dataflow Graph Execution Engine
//!
//! Flowgraph runs directed graphs of typed components: vertices build as
//! soon as their dependencies are satisfied, outputs flow along validated
//! edges, and every state change is observable as an ordered event stream.
//!
//! ## Core Concepts
//!
//! - **Components**: Async units of work with declared, typed inputs and outputs
//! - **Vertices**: Component instances inside a graph, with build lifecycle state
//! - **Edges**: Validated output-to-input connections, resolved at construction
//! - **Graph**: Built once from a serialized payload, runnable many times
//! - **Events**: Sequenced run records that can be streamed, stored, and replayed
//! - **Loops**: Cycles governed by a loop component, with a bounded iteration cap
//!
//! ## Quick Start
//!
//! ```
//! use flowgraph::component::TypeRegistry;
//! use flowgraph::event_bus::EventManager;
//! use flowgraph::graph::{EdgeDescriptor, Graph, GraphPayload, NodeDescriptor, RunOptions};
//! use flowgraph::run::{RunConfig, RunContext};
//! use flowgraph::utils::testing::{TextSource, Uppercase};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = TypeRegistry::new()
//!     .register("text_source", TextSource)
//!     .register("uppercase", Uppercase);
//!
//! let payload = GraphPayload::new()
//!     .with_node(NodeDescriptor::new("source", "text_source").with_config("text", json!("hello")))
//!     .with_node(NodeDescriptor::new("shout", "uppercase"))
//!     .with_edge(EdgeDescriptor::new("source", "text", "shout", "input"));
//!
//! let mut graph = Graph::from_payload(&payload, &registry)?;
//!
//! let config = RunConfig::default();
//! let events = EventManager::new();
//! let mut ctx = RunContext::new();
//! let report = graph.run(&mut ctx, RunOptions::new(&config, &events)).await?;
//!
//! assert!(report.is_success());
//! assert_eq!(
//!     report.vertex("shout").and_then(|v| v.results.get("output")),
//!     Some(&json!("HELLO"))
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`component`] - Component trait, specs, and the type registry
//! - [`vertex`] - Vertex state and build lifecycle
//! - [`edge`] - Edge resolution and type compatibility
//! - [`graph`] - Payload resolution, topology, and the run loop
//! - [`run`] - Run configuration, context, and runnable tracking
//! - [`event_bus`] - Event fan-out, sinks, and the recorder
//! - [`cache`] - Build-result caching keyed by input fingerprint

pub mod cache;
pub mod component;
pub mod edge;
pub mod event_bus;
pub mod graph;
pub mod run;
pub mod telemetry;
pub mod types;
pub mod utils;
pub mod vertex;
