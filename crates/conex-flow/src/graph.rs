use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;

use crate::error::FlowError;

/// Graph structure for traversal and analysis.
///
/// Node order follows definition order so traversal is deterministic.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Adjacency list: node_id -> list of downstream node_ids.
  adjacency: IndexMap<String, Vec<String>>,
  /// Reverse adjacency: node_id -> list of upstream node_ids.
  reverse_adjacency: IndexMap<String, Vec<String>>,
  /// Nodes with no incoming edges.
  entry_points: Vec<String>,
}

impl Graph {
  /// Build a graph from node ids and edges.
  ///
  /// Duplicate edges are collapsed. Edge endpoints must already be known
  /// node ids.
  pub fn new<'a>(
    node_ids: impl IntoIterator<Item = &'a str>,
    edges: &[(String, String)],
  ) -> Self {
    let mut adjacency: IndexMap<String, Vec<String>> = IndexMap::new();
    let mut reverse_adjacency: IndexMap<String, Vec<String>> = IndexMap::new();

    for node_id in node_ids {
      adjacency.entry(node_id.to_string()).or_default();
      reverse_adjacency.entry(node_id.to_string()).or_default();
    }

    for (from, to) in edges {
      let downstream = adjacency.entry(from.clone()).or_default();
      if !downstream.contains(to) {
        downstream.push(to.clone());
        reverse_adjacency
          .entry(to.clone())
          .or_default()
          .push(from.clone());
      }
    }

    let entry_points: Vec<String> = reverse_adjacency
      .iter()
      .filter(|(_, incoming)| incoming.is_empty())
      .map(|(id, _)| id.clone())
      .collect();

    Self {
      adjacency,
      reverse_adjacency,
      entry_points,
    }
  }

  /// Get entry points (nodes with no incoming edges).
  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Get downstream nodes for a given node.
  pub fn downstream(&self, node_id: &str) -> &[String] {
    self
      .adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Get upstream nodes for a given node.
  pub fn upstream(&self, node_id: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// All nodes reachable by walking edges backwards from `node_id`.
  pub fn ancestors(&self, node_id: &str) -> HashSet<String> {
    self.walk(node_id, |id| self.upstream(id))
  }

  /// All nodes reachable by walking edges forwards from `node_id`.
  pub fn descendants(&self, node_id: &str) -> HashSet<String> {
    self.walk(node_id, |id| self.downstream(id))
  }

  fn walk<'a>(&'a self, start: &str, next: impl Fn(&str) -> &'a [String]) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut queue: VecDeque<&str> = next(start).iter().map(String::as_str).collect();
    while let Some(id) = queue.pop_front() {
      if seen.insert(id.to_string()) {
        queue.extend(next(id).iter().map(String::as_str));
      }
    }
    seen
  }

  /// Kahn's algorithm over the graph.
  ///
  /// Returns `CycleDetected` with the nodes that could not be ordered.
  pub fn topological_order(&self) -> Result<Vec<String>, FlowError> {
    let mut in_degree: HashMap<&str, usize> = self
      .reverse_adjacency
      .iter()
      .map(|(id, incoming)| (id.as_str(), incoming.len()))
      .collect();

    let mut queue: VecDeque<&str> = self.entry_points.iter().map(String::as_str).collect();
    let mut order = Vec::with_capacity(self.adjacency.len());

    while let Some(current) = queue.pop_front() {
      order.push(current.to_string());
      for next in self.downstream(current) {
        if let Some(degree) = in_degree.get_mut(next.as_str()) {
          *degree -= 1;
          if *degree == 0 {
            queue.push_back(next.as_str());
          }
        }
      }
    }

    if order.len() != self.adjacency.len() {
      let remaining = self
        .adjacency
        .keys()
        .filter(|id| !order.contains(id))
        .cloned()
        .collect();
      return Err(FlowError::CycleDetected(remaining));
    }

    Ok(order)
  }
}
