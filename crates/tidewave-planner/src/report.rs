//! Output documents rendered once per planning run.
//!
//! Four JSON artifacts land in the output directory: the wave plan, a
//! node-link graph document, the blocker list, and a dashboard summary.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tidewave_inventory::{MigrationUnit, Priority, UnitStatus};
use tidewave_graph::{DependencyEdge, EdgeKind};
use tracing::info;

use crate::blockers::{Blocker, Severity};
use crate::error::PlannerError;
use crate::plan::WavePlan;

/// Node-link rendering of the dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDoc {
  pub nodes: Vec<GraphNode>,
  pub links: Vec<GraphLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
  pub id: String,
  pub module: String,
  pub priority: Priority,
  pub status: UnitStatus,
  pub complexity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphLink {
  pub source: String,
  pub target: String,
  pub value: u8,
  pub kind: EdgeKind,
}

/// Per-module completion rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleProgress {
  pub total: usize,
  pub completed: usize,
  pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveSummary {
  pub id: String,
  pub name: String,
  pub units: usize,
  pub estimated_effort_days: u64,
  pub best_effort: bool,
}

/// Dashboard rollup of the plan and its blockers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
  pub total_units: usize,
  pub completed_units: usize,
  pub completion_percent: f64,
  pub total_waves: usize,
  pub estimated_total_effort_days: u64,
  pub progress_by_module: BTreeMap<String, ModuleProgress>,
  pub waves: Vec<WaveSummary>,
  /// Up to five critical/high blockers, most severe first.
  pub blocker_highlights: Vec<Blocker>,
  pub generated_at: chrono::DateTime<chrono::Utc>,
}

/// Render the node-link document for the graph view.
///
/// A node reads as blocked when any blocker names it, otherwise it carries
/// the unit's own status.
pub fn build_graph_doc(
  units: &[MigrationUnit],
  edges: &[DependencyEdge],
  blockers: &[Blocker],
) -> GraphDoc {
  let nodes = units
    .iter()
    .map(|unit| {
      let flagged = blockers.iter().any(|b| b.affects_any(&[unit.id.as_str()]));
      GraphNode {
        id: unit.id.clone(),
        module: unit.module.clone(),
        priority: unit.priority,
        status: if flagged && !unit.status.is_terminal() {
          UnitStatus::Blocked
        } else {
          unit.status
        },
        complexity: unit.complexity,
      }
    })
    .collect();

  let links = edges
    .iter()
    .map(|edge| GraphLink {
      source: edge.source.clone(),
      target: edge.target.clone(),
      value: edge.weight,
      kind: edge.kind,
    })
    .collect();

  GraphDoc { nodes, links }
}

/// Roll the plan and blockers up into the dashboard summary.
pub fn build_dashboard(
  units: &[MigrationUnit],
  plan: &WavePlan,
  blockers: &[Blocker],
) -> DashboardSummary {
  let mut progress_by_module: BTreeMap<String, ModuleProgress> = BTreeMap::new();
  for unit in units {
    let entry = progress_by_module
      .entry(unit.module.clone())
      .or_insert(ModuleProgress {
        total: 0,
        completed: 0,
        percent: 0.0,
      });
    entry.total += 1;
    if unit.status.is_terminal() {
      entry.completed += 1;
    }
  }
  for progress in progress_by_module.values_mut() {
    progress.percent = if progress.total == 0 {
      0.0
    } else {
      progress.completed as f64 / progress.total as f64 * 100.0
    };
  }

  let mut highlights: Vec<Blocker> = blockers
    .iter()
    .filter(|b| b.severity >= Severity::High)
    .cloned()
    .collect();
  highlights.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.id.cmp(&b.id)));
  highlights.truncate(5);

  DashboardSummary {
    total_units: plan.total_units,
    completed_units: plan.completed_units,
    completion_percent: if plan.total_units == 0 {
      0.0
    } else {
      plan.completed_units as f64 / plan.total_units as f64 * 100.0
    },
    total_waves: plan.total_waves,
    estimated_total_effort_days: plan.estimated_total_effort_days,
    progress_by_module,
    waves: plan
      .waves
      .iter()
      .map(|w| WaveSummary {
        id: w.id.clone(),
        name: w.name.clone(),
        units: w.units.len(),
        estimated_effort_days: w.estimated_effort_days,
        best_effort: w.best_effort,
      })
      .collect(),
    blocker_highlights: highlights,
    generated_at: plan.generated_at,
  }
}

/// Write the four run artifacts into `dir`, creating it if needed.
pub fn write_documents(
  dir: &Path,
  plan: &WavePlan,
  graph: &GraphDoc,
  blockers: &[Blocker],
  dashboard: &DashboardSummary,
) -> Result<(), PlannerError> {
  fs::create_dir_all(dir).map_err(|source| PlannerError::Write {
    path: dir.to_path_buf(),
    source,
  })?;

  write_json(dir, "wave_plan.json", "wave plan", plan)?;
  write_json(dir, "graph.json", "graph", graph)?;
  write_json(dir, "blockers.json", "blockers", &blockers)?;
  write_json(dir, "dashboard.json", "dashboard", dashboard)?;

  info!(dir = %dir.display(), "planning documents written");
  Ok(())
}

fn write_json<T: Serialize>(
  dir: &Path,
  file: &str,
  doc: &'static str,
  value: &T,
) -> Result<(), PlannerError> {
  let path = dir.join(file);
  let body =
    serde_json::to_vec_pretty(value).map_err(|source| PlannerError::Serialize { doc, source })?;
  fs::write(&path, body).map_err(|source| PlannerError::Write { path, source })
}
