//! Ordering of plan actions into parallel waves.
//!
//! Actions whose paths overlap (same directory, or one nested in the other)
//! must not run at the same time. Each such pair gets an edge from the earlier
//! action (in plan order) to the later one; the waves are the levels of the
//! resulting DAG, so every wave holds actions with pairwise disjoint paths.

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::entry::paths_overlap;
use crate::plan::SyncAction;

pub struct ActionDag {
  /// Nodes are indices into the plan's action list.
  graph: DiGraph<usize, ()>,
}

impl ActionDag {
  pub fn from_actions(actions: &[SyncAction]) -> Self {
    let mut graph = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..actions.len()).map(|i| graph.add_node(i)).collect();

    for (i, earlier) in actions.iter().enumerate() {
      for (j, later) in actions.iter().enumerate().skip(i + 1) {
        if paths_overlap(earlier.path(), later.path()) {
          graph.add_edge(nodes[i], nodes[j], ());
        }
      }
    }

    Self { graph }
  }

  /// Action indices grouped into waves, each wave sorted ascending.
  ///
  /// Edges only point forward in plan order, so the graph is acyclic and every
  /// action lands in exactly one wave.
  pub fn waves(&self) -> Vec<Vec<usize>> {
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();
    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let ready: Vec<NodeIndex> = remaining.iter().filter(|&&idx| in_degree[&idx] == 0).copied().collect();
      if ready.is_empty() {
        break;
      }

      for &idx in &ready {
        remaining.remove(&idx);
        for neighbor in self.graph.neighbors_directed(idx, Direction::Outgoing) {
          if let Some(deg) = in_degree.get_mut(&neighbor) {
            *deg = deg.saturating_sub(1);
          }
        }
      }

      let mut wave: Vec<usize> = ready.iter().map(|&idx| self.graph[idx]).collect();
      wave.sort_unstable();
      waves.push(wave);
    }

    waves
  }
}
