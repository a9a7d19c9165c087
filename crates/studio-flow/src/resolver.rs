//! Execution order resolution.
//!
//! Kahn's algorithm over node-to-node dependencies, with the ready set keyed
//! by insertion position: whenever several nodes are ready, the one added to
//! the graph first runs first. Parallel edges between the same two nodes are
//! one dependency.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use tracing::{debug, warn};

use studio_core::error::{Result, StudioError};

use crate::graph::Graph;

/// Node-to-node dependencies, indexed by insertion position.
struct Dependencies {
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
}

impl Dependencies {
    fn of(graph: &Graph) -> Self {
        let n = graph.len();
        let mut successors = vec![Vec::new(); n];
        let mut predecessors = vec![Vec::new(); n];
        let mut seen = HashSet::new();

        for edge in graph.edges() {
            let (Some(s), Some(t)) = (
                graph.position_of(&edge.source_node_id),
                graph.position_of(&edge.target_node_id),
            ) else {
                continue;
            };
            if seen.insert((s, t)) {
                successors[s].push(t);
                predecessors[t].push(s);
            }
        }

        Self {
            successors,
            predecessors,
        }
    }

    /// Topological order as positions. On a cycle, returns the partial order.
    fn order(&self) -> (Vec<usize>, bool) {
        let n = self.successors.len();
        let mut remaining: Vec<usize> = self.predecessors.iter().map(Vec::len).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = remaining
            .iter()
            .enumerate()
            .filter(|(_, deg)| **deg == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &next in &self.successors[i] {
                remaining[next] -= 1;
                if remaining[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        let complete = order.len() == n;
        (order, complete)
    }

    /// Unvisited positions that lie on at least one cycle, ascending.
    fn cycle_members(&self, visited: &[usize]) -> Vec<usize> {
        let visited: HashSet<usize> = visited.iter().copied().collect();
        (0..self.successors.len())
            .filter(|i| !visited.contains(i))
            .filter(|&i| self.reaches(i, i, &visited))
            .collect()
    }

    /// Whether `to` is reachable from `from` in one or more steps, avoiding
    /// `excluded` positions.
    fn reaches(&self, from: usize, to: usize, excluded: &HashSet<usize>) -> bool {
        let mut stack: Vec<usize> = self.successors[from].clone();
        let mut seen = HashSet::new();
        while let Some(i) = stack.pop() {
            if i == to {
                return true;
            }
            if excluded.contains(&i) || !seen.insert(i) {
                continue;
            }
            stack.extend(self.successors[i].iter().copied());
        }
        false
    }
}

/// Resolve a deterministic execution order for every node in `graph`.
///
/// Every edge `s -> t` places `s` before `t`. Nodes without edges are valid
/// starting nodes. Fails with [`StudioError::CyclicGraph`] listing, in
/// insertion order, exactly the nodes that sit on a cycle; nodes that are
/// only downstream of a cycle are left out.
pub fn resolve_order(graph: &Graph) -> Result<Vec<String>> {
    let deps = Dependencies::of(graph);
    let (order, complete) = deps.order();

    if !complete {
        let nodes = ids(graph, deps.cycle_members(&order));
        warn!(cycle = ?nodes, "Graph contains a cycle");
        return Err(StudioError::CyclicGraph { nodes });
    }

    let order = ids(graph, order);
    debug!(nodes = order.len(), "Resolved execution order");
    Ok(order)
}

/// Group the graph into dependency waves.
///
/// Wave `k` holds every node whose longest chain of upstream dependencies has
/// length `k`, so all nodes in a wave are independent of each other and every
/// dependency of a wave lies in an earlier wave. Within a wave nodes keep
/// insertion order.
pub fn resolve_waves(graph: &Graph) -> Result<Vec<Vec<String>>> {
    let deps = Dependencies::of(graph);
    let (order, complete) = deps.order();

    if !complete {
        let nodes = ids(graph, deps.cycle_members(&order));
        return Err(StudioError::CyclicGraph { nodes });
    }

    let mut level = vec![0usize; graph.len()];
    for &i in &order {
        level[i] = deps.predecessors[i]
            .iter()
            .map(|&p| level[p] + 1)
            .max()
            .unwrap_or(0);
    }

    let depth = level.iter().max().map_or(0, |&l| l + 1);
    let mut waves = vec![Vec::new(); depth];
    // Positions ascend, so each wave comes out in insertion order.
    for (i, &l) in level.iter().enumerate() {
        waves[l].push(graph.nodes()[i].id.clone());
    }
    Ok(waves)
}

fn ids(graph: &Graph, positions: Vec<usize>) -> Vec<String> {
    positions
        .into_iter()
        .map(|i| graph.nodes()[i].id.clone())
        .collect()
}
