//! DFS-based cycle detection.

use std::collections::{HashMap, HashSet};

use crate::edge::DependencyEdge;

/// Find dependency cycles in an edge set.
///
/// Depth-first search with an explicit recursion stack: a back-edge into a
/// node still on the stack yields a cycle equal to the stack slice from that
/// node to the current node inclusive. Reports the first cycle found per DFS
/// root rather than enumerating all simple cycles; one representative per
/// strongly-connected region is enough for an operator to act on, and the
/// planner only needs to know which units are cycle-gated.
///
/// The empty result is equivalent to "the graph is a DAG".
pub fn detect_cycles(edges: &[DependencyEdge]) -> Vec<Vec<String>> {
  let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
  for edge in edges {
    adjacency
      .entry(edge.source.as_str())
      .or_default()
      .push(edge.target.as_str());
  }

  // Deterministic traversal order for deterministic cycle output.
  let mut roots: Vec<&str> = adjacency.keys().copied().collect();
  roots.sort_unstable();
  for targets in adjacency.values_mut() {
    targets.sort_unstable();
  }

  let mut cycles: Vec<Vec<String>> = Vec::new();
  let mut visited: HashSet<&str> = HashSet::new();

  for root in roots {
    if visited.contains(root) {
      continue;
    }
    let mut stack: Vec<&str> = Vec::new();
    let mut on_stack: HashSet<&str> = HashSet::new();
    dfs(
      root,
      &adjacency,
      &mut visited,
      &mut stack,
      &mut on_stack,
      &mut cycles,
    );
  }

  cycles
}

fn dfs<'a>(
  node: &'a str,
  adjacency: &HashMap<&'a str, Vec<&'a str>>,
  visited: &mut HashSet<&'a str>,
  stack: &mut Vec<&'a str>,
  on_stack: &mut HashSet<&'a str>,
  cycles: &mut Vec<Vec<String>>,
) -> bool {
  visited.insert(node);
  stack.push(node);
  on_stack.insert(node);

  if let Some(targets) = adjacency.get(node) {
    for &next in targets {
      if on_stack.contains(next) {
        // Back-edge: the cycle is the stack slice from `next` to here.
        let start = stack.iter().position(|&n| n == next).unwrap_or(0);
        cycles.push(stack[start..].iter().map(|s| s.to_string()).collect());
        stack.pop();
        on_stack.remove(node);
        return true;
      }
      if !visited.contains(next) && dfs(next, adjacency, visited, stack, on_stack, cycles) {
        stack.pop();
        on_stack.remove(node);
        return true;
      }
    }
  }

  stack.pop();
  on_stack.remove(node);
  false
}
