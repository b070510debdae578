//! Dependency edge construction from declared dependencies and
//! cross-reference extracts.

use std::collections::HashMap;

use tidewave_inventory::{CrossRefDoc, MigrationUnit};
use tracing::warn;

use crate::edge::{DependencyEdge, EdgeKind};

const DECLARED_WEIGHT: u8 = 5;
const CROSS_REF_WEIGHT: u8 = 4;
const CROSS_REF_CRITICAL_WEIGHT: u8 = 8;

/// Merge declared dependencies with edges inferred from cross-reference
/// extracts into a deduplicated edge set.
///
/// Cross-reference entries name units loosely (id, path, or file name) and
/// are resolved with [`find_unit_by_path`]; entries that resolve to no unit
/// are logged and dropped, never fatal. Duplicate (source, target) pairs
/// keep the max observed weight.
pub fn build_graph(units: &[MigrationUnit], cross_refs: &[CrossRefDoc]) -> Vec<DependencyEdge> {
  let mut edges: Vec<DependencyEdge> = Vec::new();

  // Declared dependencies from the inventory.
  for unit in units {
    for dep in &unit.dependencies {
      edges.push(DependencyEdge::new(
        &unit.id,
        dep,
        DECLARED_WEIGHT,
        EdgeKind::Include,
      ));
    }
  }

  // Inferred edges from the cross-reference extracts.
  for doc in cross_refs {
    for entry in &doc.entries {
      let Some(source) = find_unit_by_path(units, &entry.unit) else {
        warn!(hint = %entry.unit, "cross-reference source matched no unit, dropped");
        continue;
      };
      for target_ref in &entry.depends_on {
        let Some(target) = find_unit_by_path(units, &target_ref.path) else {
          warn!(
            source = %source.id,
            hint = %target_ref.path,
            "cross-reference target matched no unit, dropped"
          );
          continue;
        };
        if source.id == target.id {
          continue;
        }
        let weight = if target_ref.critical {
          CROSS_REF_CRITICAL_WEIGHT
        } else {
          CROSS_REF_WEIGHT
        };
        let kind = target_ref
          .kind
          .as_deref()
          .map(EdgeKind::parse)
          .unwrap_or_default();
        edges.push(DependencyEdge::new(&source.id, &target.id, weight, kind));
      }
    }
  }

  dedupe_max_weight(edges)
}

/// Best-effort unit lookup by id, path, or substring.
///
/// Cross-reference documents rarely carry exact unit ids, so this resolves a
/// hint in three passes: exact id, exact path, then substring containment in
/// either direction. Substring matching is inherently ambiguous and can
/// produce false positives; callers treat a miss as log-and-skip.
pub fn find_unit_by_path<'a>(units: &'a [MigrationUnit], hint: &str) -> Option<&'a MigrationUnit> {
  if hint.is_empty() {
    return None;
  }
  if let Some(unit) = units.iter().find(|u| u.id == hint) {
    return Some(unit);
  }
  if let Some(unit) = units.iter().find(|u| u.path == hint) {
    return Some(unit);
  }
  units
    .iter()
    .find(|u| u.path.contains(hint) || hint.contains(u.path.as_str()))
}

fn dedupe_max_weight(edges: Vec<DependencyEdge>) -> Vec<DependencyEdge> {
  let mut merged: HashMap<(String, String), DependencyEdge> = HashMap::new();
  for edge in edges {
    let key = (edge.source.clone(), edge.target.clone());
    match merged.get_mut(&key) {
      Some(existing) => {
        if edge.weight > existing.weight {
          existing.weight = edge.weight;
          existing.kind = edge.kind;
        }
      }
      None => {
        merged.insert(key, edge);
      }
    }
  }
  let mut edges: Vec<DependencyEdge> = merged.into_values().collect();
  // Stable output order regardless of hash iteration.
  edges.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));
  edges
}
