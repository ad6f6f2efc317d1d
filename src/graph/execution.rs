//! The run loop: layered concurrent builds, output propagation, loop
//! iteration, caching, and failure isolation.
//!
//! Builds within a layer run concurrently; everything that mutates graph
//! state happens serially afterwards, in insertion order, so event streams
//! and reports are deterministic for a given set of build results.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::topology::Adjacency;
use super::{Graph, GraphError};
use crate::cache::{CacheBackend, CacheKey, CachedBuild};
use crate::component::{BuildInputs, Component, ComponentContext};
use crate::event_bus::{EventBody, EventManager, RunOutcome};
use crate::run::{RunConfig, RunContext, RunManager};
use crate::types::{BuildStatus, VertexId};

/// Everything a run needs besides the graph and its context.
#[derive(Clone, Copy)]
pub struct RunOptions<'a> {
    config: &'a RunConfig,
    events: &'a EventManager,
    cache: Option<&'a dyn CacheBackend>,
}

impl<'a> RunOptions<'a> {
    #[must_use]
    pub fn new(config: &'a RunConfig, events: &'a EventManager) -> Self {
        Self {
            config,
            events,
            cache: None,
        }
    }

    /// Reuse and store build results through the given cache.
    #[must_use]
    pub fn with_cache(mut self, cache: &'a dyn CacheBackend) -> Self {
        self.cache = Some(cache);
        self
    }
}

/// Final state of one vertex after a run.
#[derive(Clone, Debug, Serialize)]
pub struct VertexReport {
    pub status: BuildStatus,
    pub results: FxHashMap<String, Value>,
    pub artifacts: FxHashMap<String, Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub cached: bool,
    pub iterations: u32,
}

/// Outcome of a whole run, one entry per vertex.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub outcome: RunOutcome,
    pub vertices: FxHashMap<VertexId, VertexReport>,
}

impl RunReport {
    /// True when the run completed and no vertex failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Completed
            && !self
                .vertices
                .values()
                .any(|v| v.status == BuildStatus::Error)
    }

    #[must_use]
    pub fn vertex(&self, id: &str) -> Option<&VertexReport> {
        self.vertices.get(id)
    }
}

/// Per-vertex decision for one layer.
enum Step {
    Execute {
        id: VertexId,
        component: Arc<dyn Component>,
        inputs: BuildInputs,
        iteration: u32,
        key: Option<CacheKey>,
    },
    Cached {
        id: VertexId,
        build: CachedBuild,
    },
    Unready {
        id: VertexId,
        message: String,
    },
}

struct Completion {
    id: VertexId,
    results: FxHashMap<String, Value>,
    artifacts: FxHashMap<String, Value>,
    duration: Duration,
    cached: bool,
    key: Option<CacheKey>,
}

impl Graph {
    /// Drive the graph to completion.
    ///
    /// Vertices build as soon as their dependencies are met, concurrently
    /// within each wave. A failing vertex marks its downstream branch
    /// `Inactive` while unrelated branches keep running. Cancellation is
    /// observed between waves.
    #[instrument(skip_all, fields(run_id = %ctx.run_id()))]
    pub async fn run(
        &mut self,
        ctx: &mut RunContext,
        options: RunOptions<'_>,
    ) -> Result<RunReport, GraphError> {
        for id in self.vertex_ids().to_vec() {
            if let Some(vertex) = self.vertex_mut(&id) {
                vertex.reset_for_run();
            }
        }

        options.events.emit_with(|| EventBody::VerticesSorted {
            ids: self.layers().iter().flatten().cloned().collect(),
            to_run: self.layers().first().cloned().unwrap_or_default(),
        });

        let full_successors = Adjacency::from_edges(self.edges(), true).successors;
        let mut manager = RunManager::new(
            self.vertex_ids().to_vec(),
            &self.adjacency().predecessors,
            full_successors.clone(),
        );
        let mut cached_hits: FxHashSet<VertexId> = FxHashSet::default();

        let outcome = loop {
            if ctx.is_cancelled() {
                info!("cancellation observed at layer boundary");
                break RunOutcome::Cancelled;
            }
            let layer = manager.next_layer();
            if layer.is_empty() {
                if manager.pending() > 0 {
                    return Err(GraphError::Stalled {
                        pending: manager.pending_ids(),
                    });
                }
                break RunOutcome::Completed;
            }
            debug!(size = layer.len(), "starting wave");

            let steps = self.prepare_layer(ctx, options, &layer).await;
            for step in &steps {
                match step {
                    Step::Execute { id, .. } | Step::Cached { id, .. } => {
                        options
                            .events
                            .emit_with(|| EventBody::BuildStart {
                                vertex_id: id.clone(),
                            });
                        if let Some(vertex) = self.vertex_mut(id) {
                            vertex.status = BuildStatus::Building;
                        }
                    }
                    Step::Unready { .. } => {}
                }
            }

            let mut completions: FxHashMap<VertexId, Completion> = FxHashMap::default();
            let mut failures: FxHashMap<VertexId, (String, Duration)> = FxHashMap::default();
            let mut executions = Vec::new();
            for step in steps {
                match step {
                    Step::Unready { id, message } => {
                        failures.insert(id, (message, Duration::ZERO));
                    }
                    Step::Cached { id, build } => {
                        completions.insert(
                            id.clone(),
                            Completion {
                                id,
                                results: build.results,
                                artifacts: build.artifacts,
                                duration: Duration::ZERO,
                                cached: true,
                                key: None,
                            },
                        );
                    }
                    Step::Execute {
                        id,
                        component,
                        inputs,
                        iteration,
                        key,
                    } => {
                        executions.push(async move {
                            let started = Instant::now();
                            let result = component
                                .build(
                                    inputs,
                                    ComponentContext {
                                        vertex_id: id.clone(),
                                        iteration,
                                    },
                                )
                                .await;
                            (id, key, result, started.elapsed())
                        });
                    }
                }
            }
            for (id, key, result, duration) in join_all(executions).await {
                match result {
                    Ok(output) => {
                        completions.insert(
                            id.clone(),
                            Completion {
                                id,
                                results: output.results,
                                artifacts: output.artifacts,
                                duration,
                                cached: false,
                                key,
                            },
                        );
                    }
                    Err(err) => {
                        failures.insert(id, (err.to_string(), duration));
                    }
                }
            }

            // Apply in insertion order for deterministic events.
            for id in &layer {
                if let Some(completion) = completions.remove(id) {
                    if completion.cached {
                        cached_hits.insert(id.clone());
                    }
                    self.apply_success(ctx, &mut manager, options, completion)
                        .await;
                } else if let Some((message, duration)) = failures.remove(id) {
                    self.apply_failure(&mut manager, &full_successors, options, id, message, duration);
                }
            }
        };

        options
            .events
            .emit_with(|| EventBody::End { outcome });

        let vertices = self
            .vertex_ids()
            .iter()
            .filter_map(|id| {
                self.vertex(id).map(|vertex| {
                    (
                        id.clone(),
                        VertexReport {
                            status: vertex.status,
                            results: vertex.results.clone(),
                            artifacts: vertex.artifacts.clone(),
                            error: vertex.error.clone(),
                            duration_ms: vertex
                                .duration
                                .map(|d| d.as_millis() as u64)
                                .unwrap_or(0),
                            cached: cached_hits.contains(id),
                            iterations: ctx.iteration(id),
                        },
                    )
                })
            })
            .collect();

        Ok(RunReport {
            run_id: ctx.run_id().to_string(),
            outcome,
            vertices,
        })
    }

    /// Gather inputs for a wave and decide how each vertex proceeds.
    async fn prepare_layer(
        &self,
        ctx: &RunContext,
        options: RunOptions<'_>,
        layer: &[VertexId],
    ) -> Vec<Step> {
        let mut steps = Vec::with_capacity(layer.len());
        for id in layer {
            let Some(vertex) = self.vertex(id) else {
                continue;
            };
            let step = match vertex.take_build_inputs() {
                Err(err) => Step::Unready {
                    id: id.clone(),
                    message: err.to_string(),
                },
                Ok(inputs) => {
                    // Loop vertices see different feedback each pass, so
                    // their builds are never reused.
                    let key = if options.cache.is_some() && !self.is_loop_vertex(id) {
                        Some(CacheKey::for_inputs(id, &inputs))
                    } else {
                        None
                    };
                    let hit = match (options.cache, &key) {
                        (Some(cache), Some(key)) => cache.get(key).await,
                        _ => None,
                    };
                    match hit {
                        Some(build) => Step::Cached {
                            id: id.clone(),
                            build,
                        },
                        None => Step::Execute {
                            id: id.clone(),
                            component: vertex.component(),
                            inputs,
                            iteration: ctx.iteration(id),
                            key,
                        },
                    }
                }
            };
            steps.push(step);
        }
        steps
    }

    async fn apply_success(
        &mut self,
        ctx: &mut RunContext,
        manager: &mut RunManager,
        options: RunOptions<'_>,
        completion: Completion,
    ) {
        let Completion {
            id,
            results,
            artifacts,
            duration,
            cached,
            key,
        } = completion;

        let (wants_iteration, body_members) = match self.loop_region(&id) {
            Some(region) => (
                region.body_outputs.iter().any(|o| results.contains_key(o)),
                region
                    .members
                    .iter()
                    .filter(|m| **m != id)
                    .cloned()
                    .collect::<Vec<_>>(),
            ),
            None => (false, Vec::new()),
        };

        if wants_iteration {
            let iteration = ctx.bump_iteration(&id);
            let cap = options.config.max_loop_iterations();
            if iteration > cap {
                let message = format!("loop exceeded {cap} iterations");
                let full_successors = Adjacency::from_edges(self.edges(), true).successors;
                self.apply_failure(manager, &full_successors, options, &id, message, duration);
                return;
            }
        }

        if let Some(vertex) = self.vertex_mut(&id) {
            vertex.record_success(results.clone(), artifacts.clone(), duration);
        }
        if !cached {
            if let (Some(cache), Some(key)) = (options.cache, key) {
                cache
                    .set(
                        key,
                        CachedBuild {
                            results: results.clone(),
                            artifacts,
                        },
                    )
                    .await;
            }
        }

        options.events.emit_with(|| EventBody::EndVertex {
            vertex_id: id.clone(),
            status: BuildStatus::Built,
            valid: true,
            duration_ms: duration.as_millis() as u64,
            cached,
            error: None,
        });

        // Propagate only the outputs the build actually produced.
        let assignments: Vec<(VertexId, String, Value)> = self
            .edges_from(&id)
            .filter_map(|edge| {
                results.get(&edge.source_output).map(|value| {
                    (edge.target_id.clone(), edge.target_input.clone(), value.clone())
                })
            })
            .collect();
        for (target, input, value) in assignments {
            if let Some(vertex) = self.vertex_mut(&target) {
                if let Err(err) = vertex.set_input(&input, value) {
                    warn!(vertex = %target, %err, "dropping propagated value");
                }
            }
        }

        options.events.emit_with(|| EventBody::BuildEnd {
            vertex_id: id.clone(),
        });

        if wants_iteration {
            debug!(vertex = %id, iteration = ctx.iteration(&id), "loop iterating");
            manager.defer(&id);
            for member in &body_members {
                if let Some(vertex) = self.vertex_mut(member) {
                    vertex.reset_for_iteration();
                }
            }
            manager.requeue(&body_members, &id);
        } else {
            manager.mark_built(&id);
        }
    }

    /// Record a failure, then walk the downstream branch and deactivate
    /// every vertex that has not already reached a terminal state.
    fn apply_failure(
        &mut self,
        manager: &mut RunManager,
        full_successors: &FxHashMap<VertexId, Vec<VertexId>>,
        options: RunOptions<'_>,
        id: &str,
        message: String,
        duration: Duration,
    ) {
        warn!(vertex = %id, %message, "vertex build failed");
        if let Some(vertex) = self.vertex_mut(id) {
            vertex.record_failure(message.clone(), duration);
        }
        options.events.emit_with(|| EventBody::Error {
            vertex_id: Some(id.to_string()),
            message: message.clone(),
        });
        options.events.emit_with(|| EventBody::EndVertex {
            vertex_id: id.to_string(),
            status: BuildStatus::Error,
            valid: false,
            duration_ms: duration.as_millis() as u64,
            cached: false,
            error: Some(message),
        });
        manager.deactivate(id);

        let mut visited: FxHashSet<VertexId> = FxHashSet::default();
        let mut queue: Vec<VertexId> = full_successors
            .get(id)
            .into_iter()
            .flatten()
            .cloned()
            .collect();
        while let Some(next) = queue.pop() {
            if !visited.insert(next.clone()) {
                continue;
            }
            // A deferred loop vertex can be pending with a Built status
            // from an earlier iteration; pending-ness decides, not status.
            if manager.is_pending(&next) {
                if let Some(vertex) = self.vertex_mut(&next) {
                    vertex.status = BuildStatus::Inactive;
                }
                manager.deactivate(&next);
                options.events.emit_with(|| EventBody::EndVertex {
                    vertex_id: next.clone(),
                    status: BuildStatus::Inactive,
                    valid: false,
                    duration_ms: 0,
                    cached: false,
                    error: None,
                });
            }
            queue.extend(
                full_successors
                    .get(&next)
                    .into_iter()
                    .flatten()
                    .cloned(),
            );
        }
    }
}
