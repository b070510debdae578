use std::collections::HashMap;

use crate::edge::DependencyEdge;

/// Adjacency structure over a dependency edge set.
///
/// Forward adjacency follows `source -> target` ("requires"); reverse
/// adjacency answers "who is blocked by this unit".
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
  adjacency: HashMap<String, Vec<String>>,
  reverse_adjacency: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
  /// Build the adjacency lists from an edge set.
  pub fn new(edges: &[DependencyEdge]) -> Self {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();

    for edge in edges {
      adjacency
        .entry(edge.source.clone())
        .or_default()
        .push(edge.target.clone());
      reverse_adjacency
        .entry(edge.target.clone())
        .or_default()
        .push(edge.source.clone());
    }

    Self {
      adjacency,
      reverse_adjacency,
    }
  }

  /// Units this unit requires (outgoing edges).
  pub fn dependencies_of(&self, id: &str) -> &[String] {
    self.adjacency.get(id).map(|v| v.as_slice()).unwrap_or(&[])
  }

  /// Units that require this unit (incoming edges).
  pub fn dependents_of(&self, id: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Number of incoming edges: how many units this one blocks.
  pub fn inbound_count(&self, id: &str) -> usize {
    self.dependents_of(id).len()
  }
}
