//! Dependency-order computation: adjacency maps, cycle discovery, and the
//! layered topological sort that drives scheduling.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::edge::Edge;
use crate::types::VertexId;

/// Predecessor and successor lists derived from a set of edges.
///
/// Parallel edges between the same pair of vertices collapse to a single
/// adjacency entry; scheduling cares about the pair, not the port.
#[derive(Debug, Default, Clone)]
pub struct Adjacency {
    pub predecessors: FxHashMap<VertexId, Vec<VertexId>>,
    pub successors: FxHashMap<VertexId, Vec<VertexId>>,
}

impl Adjacency {
    /// Build adjacency from `edges`, skipping those marked as feedback when
    /// `include_feedback` is false.
    #[must_use]
    pub fn from_edges(edges: &[Edge], include_feedback: bool) -> Self {
        let mut adjacency = Self::default();
        let mut seen: FxHashSet<(&str, &str)> = FxHashSet::default();
        for edge in edges {
            if edge.feedback && !include_feedback {
                continue;
            }
            if !seen.insert((&edge.source_id, &edge.target_id)) {
                continue;
            }
            adjacency
                .predecessors
                .entry(edge.target_id.clone())
                .or_default()
                .push(edge.source_id.clone());
            adjacency
                .successors
                .entry(edge.source_id.clone())
                .or_default()
                .push(edge.target_id.clone());
        }
        adjacency
    }
}

/// Strongly connected components of the directed graph over `order`.
///
/// Only components that actually contain a cycle are returned: either more
/// than one vertex, or a single vertex with a self edge. Members come back
/// in insertion order.
#[must_use]
pub fn cyclic_components(
    order: &[VertexId],
    successors: &FxHashMap<VertexId, Vec<VertexId>>,
) -> Vec<Vec<VertexId>> {
    let index_of: FxHashMap<&VertexId, usize> =
        order.iter().enumerate().map(|(i, id)| (id, i)).collect();
    let adjacency: Vec<Vec<usize>> = order
        .iter()
        .map(|id| {
            successors
                .get(id)
                .into_iter()
                .flatten()
                .filter_map(|succ| index_of.get(succ).copied())
                .collect()
        })
        .collect();

    let components = tarjan(&adjacency);

    let mut cyclic = Vec::new();
    for component in components {
        let has_cycle = component.len() > 1
            || component
                .iter()
                .any(|&v| adjacency[v].contains(&v));
        if has_cycle {
            let mut members: Vec<usize> = component;
            members.sort_unstable();
            cyclic.push(members.into_iter().map(|v| order[v].clone()).collect());
        }
    }
    cyclic
}

// Iterative Tarjan; recursion would overflow on deep chains.
fn tarjan(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    const UNVISITED: usize = usize::MAX;
    let n = adjacency.len();
    let mut index = vec![UNVISITED; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut components = Vec::new();
    // (vertex, next child offset)
    let mut frames: Vec<(usize, usize)> = Vec::new();

    for start in 0..n {
        if index[start] != UNVISITED {
            continue;
        }
        frames.push((start, 0));
        while let Some(&mut (v, ref mut child)) = frames.last_mut() {
            if *child == 0 {
                index[v] = next_index;
                lowlink[v] = next_index;
                next_index += 1;
                stack.push(v);
                on_stack[v] = true;
            }
            if let Some(&w) = adjacency[v].get(*child) {
                *child += 1;
                if index[w] == UNVISITED {
                    frames.push((w, 0));
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
            } else {
                frames.pop();
                if let Some(&(parent, _)) = frames.last() {
                    lowlink[parent] = lowlink[parent].min(lowlink[v]);
                }
                if lowlink[v] == index[v] {
                    let mut component = Vec::new();
                    while let Some(w) = stack.pop() {
                        on_stack[w] = false;
                        component.push(w);
                        if w == v {
                            break;
                        }
                    }
                    components.push(component);
                }
            }
        }
    }
    components
}

/// Kahn's algorithm grouped into layers. Within a layer, vertices keep the
/// order they appear in `order`, which makes the schedule deterministic.
///
/// Returns the vertices left unplaced when the graph has a cycle the caller
/// failed to break.
pub fn layered_sort(
    order: &[VertexId],
    predecessors: &FxHashMap<VertexId, Vec<VertexId>>,
) -> Result<Vec<Vec<VertexId>>, Vec<VertexId>> {
    let members: FxHashSet<&VertexId> = order.iter().collect();
    let mut remaining: FxHashMap<&VertexId, FxHashSet<&VertexId>> = order
        .iter()
        .map(|id| {
            let preds: FxHashSet<&VertexId> = predecessors
                .get(id)
                .into_iter()
                .flatten()
                .filter(|p| members.contains(p))
                .collect();
            (id, preds)
        })
        .collect();

    let mut layers: Vec<Vec<VertexId>> = Vec::new();
    let mut placed: FxHashSet<&VertexId> = FxHashSet::default();
    while placed.len() < order.len() {
        let layer: Vec<&VertexId> = order
            .iter()
            .filter(|id| {
                !placed.contains(id)
                    && remaining
                        .get(id)
                        .is_none_or(|preds| preds.iter().all(|p| placed.contains(p)))
            })
            .collect();
        if layer.is_empty() {
            let leftover = order
                .iter()
                .filter(|id| !placed.contains(id))
                .cloned()
                .collect();
            return Err(leftover);
        }
        for id in &layer {
            placed.insert(*id);
            remaining.remove(id);
        }
        layers.push(layer.into_iter().cloned().collect());
    }
    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<VertexId> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    fn successors(pairs: &[(&str, &str)]) -> FxHashMap<VertexId, Vec<VertexId>> {
        let mut map: FxHashMap<VertexId, Vec<VertexId>> = FxHashMap::default();
        for (from, to) in pairs {
            map.entry((*from).to_string())
                .or_default()
                .push((*to).to_string());
        }
        map
    }

    fn predecessors(pairs: &[(&str, &str)]) -> FxHashMap<VertexId, Vec<VertexId>> {
        let mut map: FxHashMap<VertexId, Vec<VertexId>> = FxHashMap::default();
        for (from, to) in pairs {
            map.entry((*to).to_string())
                .or_default()
                .push((*from).to_string());
        }
        map
    }

    #[test]
    fn diamond_layers_in_insertion_order() {
        let order = ids(&["A", "B", "C", "D"]);
        let preds = predecessors(&[("A", "B"), ("A", "C"), ("B", "D"), ("C", "D")]);
        let layers = layered_sort(&order, &preds).expect("acyclic");
        assert_eq!(layers, vec![ids(&["A"]), ids(&["B", "C"]), ids(&["D"])]);
    }

    #[test]
    fn insertion_order_breaks_ties() {
        // C before B in insertion order, both runnable at once.
        let order = ids(&["A", "C", "B"]);
        let preds = predecessors(&[("A", "B"), ("A", "C")]);
        let layers = layered_sort(&order, &preds).expect("acyclic");
        assert_eq!(layers[1], ids(&["C", "B"]));
    }

    #[test]
    fn unbroken_cycle_reports_leftover_vertices() {
        let order = ids(&["A", "B", "C"]);
        let preds = predecessors(&[("A", "B"), ("B", "C"), ("C", "B")]);
        let leftover = layered_sort(&order, &preds).unwrap_err();
        assert_eq!(leftover, ids(&["B", "C"]));
    }

    #[test]
    fn sccs_find_only_real_cycles() {
        let order = ids(&["A", "B", "C", "D"]);
        let succs = successors(&[("A", "B"), ("B", "C"), ("C", "B"), ("C", "D")]);
        let cycles = cyclic_components(&order, &succs);
        assert_eq!(cycles, vec![ids(&["B", "C"])]);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let order = ids(&["A"]);
        let succs = successors(&[("A", "A")]);
        assert_eq!(cyclic_components(&order, &succs), vec![ids(&["A"])]);
    }

    #[test]
    fn acyclic_graph_has_no_cyclic_components() {
        let order = ids(&["A", "B"]);
        let succs = successors(&[("A", "B")]);
        assert!(cyclic_components(&order, &succs).is_empty());
    }
}
