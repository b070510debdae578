//! Greedy wave construction over the scored backlog.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tidewave_inventory::{MigrationUnit, Priority};
use tidewave_graph::{DependencyEdge, DependencyGraph};
use tracing::{info, warn};

use crate::blockers::{Blocker, BlockerKind, Severity};
use crate::score::{annotate_blocking, composite_score};

/// Planner tunables.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
  /// Maximum number of units placed in one wave.
  pub max_wave_size: usize,
  /// Hours of member effort that make up one wave-effort day.
  pub hours_per_day: f64,
}

impl Default for PlannerConfig {
  fn default() -> Self {
    Self {
      max_wave_size: 10,
      hours_per_day: 8.0,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WaveStatus {
  #[default]
  Pending,
  InProgress,
  Completed,
  Blocked,
}

/// An ordered batch of units scheduled together.
///
/// Predecessor waves always precede a wave, except for explicitly flagged
/// best-effort waves, which waive dependency gating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wave {
  pub id: String,
  pub name: String,
  pub priority: Priority,
  pub units: Vec<MigrationUnit>,
  /// Ids of waves that must complete before this one.
  pub predecessors: Vec<String>,
  /// Aggregate effort in days: ceil(sum of member hours / hours_per_day).
  pub estimated_effort_days: u64,
  pub status: WaveStatus,
  /// Set when dependency gating could not be honored (cycles or missing
  /// data); such a wave needs operator attention before dispatch.
  pub best_effort: bool,
  pub blockers: Vec<Blocker>,
}

/// The wave-plan artifact produced once per planning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WavePlan {
  pub total_units: usize,
  pub completed_units: usize,
  pub total_waves: usize,
  pub estimated_total_effort_days: u64,
  pub waves: Vec<Wave>,
  pub generated_at: chrono::DateTime<chrono::Utc>,
  pub version: String,
}

/// Partition the backlog into ordered waves.
///
/// Units are scored, sorted (score descending, id as the deterministic
/// tie-break), then batched greedily: a unit is placeable when every
/// dependency sits in an earlier wave. When nothing is placeable the top
/// remaining units form a flagged best-effort wave, so no unit is ever
/// dropped from the plan.
pub fn plan(
  units: &[MigrationUnit],
  edges: &[DependencyEdge],
  blockers: &[Blocker],
  config: &PlannerConfig,
) -> WavePlan {
  let graph = DependencyGraph::new(edges);

  let mut scored: Vec<MigrationUnit> = units.to_vec();
  annotate_blocking(&mut scored, &graph);
  for unit in &mut scored {
    unit.score = composite_score(unit);
  }
  scored.sort_by(|a, b| {
    b.score
      .partial_cmp(&a.score)
      .unwrap_or(std::cmp::Ordering::Equal)
      .then_with(|| a.id.cmp(&b.id))
  });

  let known_ids: HashSet<&str> = scored.iter().map(|u| u.id.as_str()).collect();
  let mut placed: HashSet<String> = HashSet::new();
  let mut waves: Vec<Wave> = Vec::new();

  while placed.len() < scored.len() {
    let ready: Vec<&MigrationUnit> = scored
      .iter()
      .filter(|u| !placed.contains(&u.id))
      .filter(|u| {
        u.dependencies
          .iter()
          // Dependencies outside the inventory cannot gate placement.
          .all(|dep| placed.contains(dep) || !known_ids.contains(dep.as_str()))
      })
      .take(config.max_wave_size)
      .collect();

    let (members, best_effort): (Vec<MigrationUnit>, bool) = if ready.is_empty() {
      // Remaining units are all gated (typically by a cycle): take the top
      // scorers anyway and flag the wave.
      let remaining: Vec<MigrationUnit> = scored
        .iter()
        .filter(|u| !placed.contains(&u.id))
        .take(config.max_wave_size)
        .cloned()
        .collect();
      (remaining, true)
    } else {
      (ready.into_iter().cloned().collect(), false)
    };

    if members.is_empty() {
      break;
    }

    let index = waves.len() + 1;
    let member_ids: Vec<&str> = members.iter().map(|u| u.id.as_str()).collect();
    let mut wave_blockers: Vec<Blocker> = blockers
      .iter()
      .filter(|b| b.affects_any(&member_ids))
      .cloned()
      .collect();

    if best_effort {
      warn!(
        wave = index,
        units = members.len(),
        "no fully-ready units remain; emitting best-effort wave"
      );
      wave_blockers.push(Blocker {
        id: format!("wave-{index}-gated"),
        kind: BlockerKind::Circular,
        description: "wave placed despite unresolved dependency gating".to_string(),
        severity: Severity::High,
        affected: member_ids.iter().map(|id| id.to_string()).collect(),
        resolution: Some("review member dependencies before dispatching".to_string()),
      });
    }

    let status = if wave_blockers
      .iter()
      .any(|b| b.severity >= Severity::High)
    {
      WaveStatus::Blocked
    } else {
      WaveStatus::Pending
    };

    for unit in &members {
      placed.insert(unit.id.clone());
    }

    let total_hours: f64 = members.iter().map(|u| u.estimated_effort_hours).sum();
    waves.push(Wave {
      id: format!("wave-{index}"),
      name: if best_effort {
        format!("Wave {index} (best effort)")
      } else {
        format!("Wave {index}")
      },
      priority: members
        .iter()
        .map(|u| u.priority)
        .max()
        .unwrap_or(Priority::Low),
      units: members,
      predecessors: Vec::new(),
      estimated_effort_days: (total_hours / config.hours_per_day).ceil() as u64,
      status,
      best_effort,
      blockers: wave_blockers,
    });
  }

  resolve_predecessors(&mut waves);

  let completed_units = units
    .iter()
    .filter(|u| u.status.is_terminal())
    .count();
  let estimated_total_effort_days = waves.iter().map(|w| w.estimated_effort_days).sum();

  info!(
    waves = waves.len(),
    units = units.len(),
    effort_days = estimated_total_effort_days,
    "wave plan generated"
  );

  WavePlan {
    total_units: units.len(),
    completed_units,
    total_waves: waves.len(),
    estimated_total_effort_days,
    waves,
    generated_at: chrono::Utc::now(),
    version: env!("CARGO_PKG_VERSION").to_string(),
  }
}

/// A wave's predecessors are the waves holding its members' dependencies.
fn resolve_predecessors(waves: &mut [Wave]) {
  let wave_of_unit: std::collections::HashMap<String, String> = waves
    .iter()
    .flat_map(|w| w.units.iter().map(|u| (u.id.clone(), w.id.clone())))
    .collect();

  for wave in waves.iter_mut() {
    let mut predecessors: Vec<String> = wave
      .units
      .iter()
      .flat_map(|u| u.dependencies.iter())
      .filter_map(|dep| wave_of_unit.get(dep))
      .filter(|id| **id != wave.id)
      .cloned()
      .collect();
    predecessors.sort();
    predecessors.dedup();
    wave.predecessors = predecessors;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tidewave_graph::build_graph;
  use tidewave_inventory::{Priority, UnitStatus};

  fn unit(id: &str, deps: &[&str]) -> MigrationUnit {
    MigrationUnit::new(id, format!("src/m/{id}.php")).with_dependencies(deps)
  }

  fn plan_for(units: Vec<MigrationUnit>) -> WavePlan {
    let edges = build_graph(&units, &[]);
    plan(&units, &edges, &[], &PlannerConfig::default())
  }

  #[test]
  fn diamond_backlog_yields_three_waves() {
    let plan = plan_for(vec![
      unit("a", &[]),
      unit("b", &["a"]),
      unit("c", &["a"]),
      unit("d", &["b", "c"]),
    ]);

    assert_eq!(plan.total_waves, 3);
    let ids: Vec<Vec<&str>> = plan
      .waves
      .iter()
      .map(|w| w.units.iter().map(|u| u.id.as_str()).collect())
      .collect();
    assert_eq!(ids[0], ["a"]);
    assert_eq!({
      let mut w: Vec<&str> = ids[1].clone();
      w.sort();
      w
    }, ["b", "c"]);
    assert_eq!(ids[2], ["d"]);
    assert!(plan.waves.iter().all(|w| !w.best_effort));
  }

  #[test]
  fn dependencies_always_land_in_earlier_waves() {
    let units = vec![
      unit("a", &[]),
      unit("b", &["a"]),
      unit("c", &["b"]),
      unit("d", &["a", "c"]),
      unit("e", &[]),
    ];
    let plan = plan_for(units);

    let wave_index = |id: &str| {
      plan
        .waves
        .iter()
        .position(|w| w.units.iter().any(|u| u.id == id))
        .unwrap()
    };
    for wave in &plan.waves {
      for member in &wave.units {
        for dep in &member.dependencies {
          assert!(wave_index(dep) < wave_index(&member.id));
        }
      }
    }
  }

  #[test]
  fn cycle_produces_single_flagged_wave() {
    let plan = plan_for(vec![unit("x", &["y"]), unit("y", &["x"])]);

    assert_eq!(plan.total_waves, 1);
    let wave = &plan.waves[0];
    assert!(wave.best_effort);
    assert_eq!(wave.status, WaveStatus::Blocked);
    assert_eq!(wave.units.len(), 2);
    assert!(wave.blockers.iter().any(|b| b.kind == BlockerKind::Circular));
  }

  #[test]
  fn max_wave_size_bounds_each_wave() {
    let units: Vec<MigrationUnit> = (0..25).map(|i| unit(&format!("u{i:02}"), &[])).collect();
    let edges = build_graph(&units, &[]);
    let config = PlannerConfig {
      max_wave_size: 10,
      ..PlannerConfig::default()
    };
    let plan = plan(&units, &edges, &[], &config);
    assert_eq!(plan.total_waves, 3);
    assert!(plan.waves.iter().all(|w| w.units.len() <= 10));
    assert_eq!(plan.waves[2].units.len(), 5);
  }

  #[test]
  fn planner_is_deterministic() {
    let units = vec![
      unit("a", &[]),
      unit("b", &["a"]),
      unit("c", &["a"]),
      unit("d", &["b", "c"]),
      unit("e", &[]),
    ];
    let edges = build_graph(&units, &[]);
    let config = PlannerConfig::default();

    let first = plan(&units, &edges, &[], &config);
    let second = plan(&units, &edges, &[], &config);

    let assignment = |p: &WavePlan| -> Vec<Vec<String>> {
      p.waves
        .iter()
        .map(|w| w.units.iter().map(|u| u.id.clone()).collect())
        .collect()
    };
    assert_eq!(assignment(&first), assignment(&second));
  }

  #[test]
  fn dispatch_order_within_wave_follows_score() {
    let mut high = unit("high", &[]);
    high.priority = Priority::Critical;
    let mut low = unit("low", &[]);
    low.priority = Priority::Low;

    let plan = plan_for(vec![low, high]);
    let first_wave: Vec<&str> = plan.waves[0].units.iter().map(|u| u.id.as_str()).collect();
    assert_eq!(first_wave, ["high", "low"]);
  }

  #[test]
  fn wave_effort_rolls_up_member_hours() {
    let mut a = unit("a", &[]);
    a.estimated_effort_hours = 6.0;
    let mut b = unit("b", &[]);
    b.estimated_effort_hours = 6.0;

    let plan = plan_for(vec![a, b]);
    // 12 hours at 8 hours/day rounds up to 2 days.
    assert_eq!(plan.waves[0].estimated_effort_days, 2);
  }

  #[test]
  fn external_dependencies_do_not_gate_placement() {
    // "vendor" is not in the inventory; it must not push "a" into a
    // best-effort wave.
    let plan = plan_for(vec![unit("a", &["vendor"])]);
    assert_eq!(plan.total_waves, 1);
    assert!(!plan.waves[0].best_effort);
  }

  #[test]
  fn completed_units_are_counted() {
    let mut done = unit("done", &[]);
    done.status = UnitStatus::Completed;
    let plan = plan_for(vec![done, unit("todo", &[])]);
    assert_eq!(plan.completed_units, 1);
    assert_eq!(plan.total_units, 2);
  }

  #[test]
  fn wave_priority_is_max_of_members() {
    let mut a = unit("a", &[]);
    a.priority = Priority::Low;
    let mut b = unit("b", &[]);
    b.priority = Priority::Critical;
    let plan = plan_for(vec![a, b]);
    assert_eq!(plan.waves[0].priority, Priority::Critical);
  }
}
