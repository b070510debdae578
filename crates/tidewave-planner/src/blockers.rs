//! Blocker analysis over the snapshot and the dependency graph.
//!
//! Blockers never halt planning: the planner attaches them read-only to the
//! waves containing affected units, and cycle-gated units still land in a
//! flagged best-effort wave.

use serde::{Deserialize, Serialize};
use tidewave_inventory::{RouteDoc, SchemaConflictDoc, Snapshot, UnitStatus};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockerKind {
  Circular,
  Schema,
  ExpiredTask,
  Structural,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
  Low,
  Medium,
  High,
  Critical,
}

impl Severity {
  fn parse(hint: Option<&str>) -> Self {
    match hint {
      Some("critical") => Severity::Critical,
      Some("high") => Severity::High,
      Some("low") => Severity::Low,
      _ => Severity::Medium,
    }
  }
}

/// An actionable obstacle attached to the waves it affects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blocker {
  pub id: String,
  pub kind: BlockerKind,
  pub description: String,
  pub severity: Severity,
  /// Ids of affected units (route patterns for structural blockers).
  pub affected: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub resolution: Option<String>,
}

impl Blocker {
  pub fn affects_any(&self, unit_ids: &[&str]) -> bool {
    self.affected.iter().any(|a| unit_ids.contains(&a.as_str()))
  }
}

/// Analysis inputs beyond the snapshot itself.
pub struct BlockerInputs<'a> {
  pub cycles: &'a [Vec<String>],
}

/// Run every blocker analysis pass over the snapshot.
///
/// Ids are derived from the pass and its inputs (never clocks or randomness)
/// so re-running on identical inputs yields identical documents.
pub fn detect_blockers(snapshot: &Snapshot, inputs: &BlockerInputs<'_>) -> Vec<Blocker> {
  let mut blockers = Vec::new();

  for (index, cycle) in inputs.cycles.iter().enumerate() {
    blockers.push(Blocker {
      id: format!("circular-{}", index + 1),
      kind: BlockerKind::Circular,
      description: format!("circular dependency detected: {}", cycle.join(" -> ")),
      severity: Severity::High,
      affected: cycle.clone(),
      resolution: Some("break the cycle or migrate the members together".to_string()),
    });
  }

  blockers.extend(schema_blockers(snapshot, &snapshot.schema_conflicts));
  blockers.extend(expired_task_blockers(snapshot));
  blockers.extend(route_blockers(&snapshot.routes));

  info!(blockers = blockers.len(), "blocker analysis complete");
  blockers
}

fn schema_blockers(snapshot: &Snapshot, doc: &SchemaConflictDoc) -> Vec<Blocker> {
  let mut tables: Vec<(&String, &tidewave_inventory::TableConflict)> = doc
    .tables
    .iter()
    .filter(|(_, conflict)| conflict.is_blocking())
    .collect();
  tables.sort_by_key(|(name, _)| name.as_str());

  tables
    .into_iter()
    .map(|(table, conflict)| {
      let affected: Vec<String> = snapshot
        .units
        .iter()
        .filter(|u| u.tables.iter().any(|t| t == table))
        .map(|u| u.id.clone())
        .collect();
      Blocker {
        id: format!("schema-{table}"),
        kind: BlockerKind::Schema,
        description: format!(
          "schema conflict on table {table}: {}",
          conflict.message.as_deref().unwrap_or("conflict detected")
        ),
        severity: Severity::parse(conflict.severity.as_deref()),
        affected,
        resolution: conflict.suggestion.clone(),
      }
    })
    .collect()
}

fn expired_task_blockers(snapshot: &Snapshot) -> Vec<Blocker> {
  let mut flagged: Vec<&str> = snapshot
    .prior_status
    .units
    .iter()
    .filter(|(_, status)| **status == UnitStatus::Blocked)
    .map(|(id, _)| id.as_str())
    .collect();
  flagged.sort_unstable();

  flagged
    .into_iter()
    .map(|id| Blocker {
      id: format!("expired-{id}"),
      kind: BlockerKind::ExpiredTask,
      description: format!("unit {id} was blocked in the previous run"),
      severity: Severity::Medium,
      affected: vec![id.to_string()],
      resolution: None,
    })
    .collect()
}

fn route_blockers(doc: &RouteDoc) -> Vec<Blocker> {
  let critical: Vec<String> = doc
    .rules
    .iter()
    .filter(|rule| rule.seo_impact.as_deref() == Some("high") && !rule.migrated)
    .map(|rule| rule.pattern.clone())
    .collect();

  if critical.is_empty() {
    return Vec::new();
  }
  vec![Blocker {
    id: "routes-critical".to_string(),
    kind: BlockerKind::Structural,
    description: format!("{} critical routes are not yet migrated", critical.len()),
    severity: Severity::High,
    affected: critical,
    resolution: None,
  }]
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;
  use tidewave_inventory::{MigrationUnit, RouteRule, StatusDoc, TableConflict};

  fn snapshot_with(units: Vec<MigrationUnit>) -> Snapshot {
    Snapshot {
      units,
      ..Snapshot::default()
    }
  }

  #[test]
  fn cycles_become_circular_blockers() {
    let snapshot = snapshot_with(vec![]);
    let cycles = vec![vec!["x".to_string(), "y".to_string()]];
    let blockers = detect_blockers(&snapshot, &BlockerInputs { cycles: &cycles });
    assert_eq!(blockers.len(), 1);
    assert_eq!(blockers[0].kind, BlockerKind::Circular);
    assert_eq!(blockers[0].id, "circular-1");
    assert_eq!(blockers[0].affected, ["x", "y"]);
  }

  #[test]
  fn schema_conflicts_map_to_affected_units() {
    let mut unit = MigrationUnit::new("orders", "src/shop/orders.php");
    unit.tables = vec!["orders".to_string()];
    let mut snapshot = snapshot_with(vec![unit, MigrationUnit::new("other", "o.php")]);
    snapshot.schema_conflicts.tables.insert(
      "orders".to_string(),
      TableConflict {
        status: "conflict".to_string(),
        message: Some("column type mismatch".to_string()),
        severity: Some("critical".to_string()),
        suggestion: Some("align column types first".to_string()),
      },
    );
    // Non-blocking states are ignored.
    snapshot.schema_conflicts.tables.insert(
      "users".to_string(),
      TableConflict {
        status: "ok".to_string(),
        message: None,
        severity: None,
        suggestion: None,
      },
    );

    let blockers = detect_blockers(&snapshot, &BlockerInputs { cycles: &[] });
    assert_eq!(blockers.len(), 1);
    assert_eq!(blockers[0].kind, BlockerKind::Schema);
    assert_eq!(blockers[0].severity, Severity::Critical);
    assert_eq!(blockers[0].affected, ["orders"]);
  }

  #[test]
  fn prior_blocked_units_surface_as_expired() {
    let mut snapshot = snapshot_with(vec![]);
    snapshot.prior_status = StatusDoc {
      units: HashMap::from([
        ("a".to_string(), UnitStatus::Blocked),
        ("b".to_string(), UnitStatus::Completed),
      ]),
    };
    let blockers = detect_blockers(&snapshot, &BlockerInputs { cycles: &[] });
    assert_eq!(blockers.len(), 1);
    assert_eq!(blockers[0].kind, BlockerKind::ExpiredTask);
    assert_eq!(blockers[0].affected, ["a"]);
  }

  #[test]
  fn unmigrated_critical_routes_are_structural() {
    let mut snapshot = snapshot_with(vec![]);
    snapshot.routes.rules = vec![
      RouteRule {
        pattern: "/fiche-produit/*".to_string(),
        seo_impact: Some("high".to_string()),
        migrated: false,
      },
      RouteRule {
        pattern: "/legal".to_string(),
        seo_impact: Some("low".to_string()),
        migrated: false,
      },
    ];
    let blockers = detect_blockers(&snapshot, &BlockerInputs { cycles: &[] });
    assert_eq!(blockers.len(), 1);
    assert_eq!(blockers[0].kind, BlockerKind::Structural);
    assert_eq!(blockers[0].affected, ["/fiche-produit/*"]);
  }
}
