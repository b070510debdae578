//! Composite scoring for migration units.

use tidewave_inventory::MigrationUnit;
use tidewave_graph::DependencyGraph;

/// Fill each unit's `blocking` list from the reverse edges of the graph.
///
/// "Blocking" means other units carry an edge into this one and cannot start
/// until it completes. The list is deduplicated and sorted for determinism.
pub fn annotate_blocking(units: &mut [MigrationUnit], graph: &DependencyGraph) {
  for unit in units.iter_mut() {
    let mut blocking: Vec<String> = graph.dependents_of(&unit.id).to_vec();
    blocking.sort();
    blocking.dedup();
    unit.blocking = blocking;
  }
}

/// Composite score for ordering the backlog.
///
/// priority_weight x (complexity + seo + business) x (1 + 0.1 x blocking
/// count). Non-decreasing in every factor: bumping priority, complexity,
/// either impact classifier, or the blocking count never lowers the score.
pub fn composite_score(unit: &MigrationUnit) -> f64 {
  let blocking_factor = 1.0 + unit.blocking.len() as f64 * 0.1;
  unit.priority.weight()
    * (unit.complexity + unit.seo_impact.factor() + unit.business_impact.factor())
    * blocking_factor
}

#[cfg(test)]
mod tests {
  use super::*;
  use tidewave_graph::{DependencyEdge, EdgeKind};
  use tidewave_inventory::{BusinessImpact, MigrationUnit, Priority, SeoImpact};

  fn base_unit() -> MigrationUnit {
    let mut unit = MigrationUnit::new("u", "src/m/u.php");
    unit.priority = Priority::Medium;
    unit.complexity = 0.5;
    unit.seo_impact = SeoImpact::Low;
    unit.business_impact = BusinessImpact::Medium;
    unit
  }

  #[test]
  fn score_is_monotone_in_priority() {
    let mut low = base_unit();
    low.priority = Priority::Low;
    let mut critical = base_unit();
    critical.priority = Priority::Critical;
    assert!(composite_score(&critical) > composite_score(&low));
  }

  #[test]
  fn score_is_monotone_in_complexity_and_impacts() {
    let unit = base_unit();
    let base = composite_score(&unit);

    let mut complex = base_unit();
    complex.complexity = 0.9;
    assert!(composite_score(&complex) > base);

    let mut seo = base_unit();
    seo.seo_impact = SeoImpact::High;
    assert!(composite_score(&seo) > base);

    let mut business = base_unit();
    business.business_impact = BusinessImpact::Critical;
    assert!(composite_score(&business) > base);
  }

  #[test]
  fn score_is_monotone_in_blocking_count() {
    let unit = base_unit();
    let mut blocking = base_unit();
    blocking.blocking = vec!["a".into(), "b".into(), "c".into()];
    assert!(composite_score(&blocking) > composite_score(&unit));
    // 3 blocked units is a 1.3x factor.
    let expected = composite_score(&unit) * 1.3;
    assert!((composite_score(&blocking) - expected).abs() < 1e-9);
  }

  #[test]
  fn annotate_blocking_uses_reverse_edges() {
    let mut units = vec![
      MigrationUnit::new("a", "a.php"),
      MigrationUnit::new("b", "b.php").with_dependencies(&["a"]),
      MigrationUnit::new("c", "c.php").with_dependencies(&["a"]),
    ];
    let edges = vec![
      DependencyEdge::new("b", "a", 5, EdgeKind::Include),
      DependencyEdge::new("c", "a", 5, EdgeKind::Include),
    ];
    let graph = DependencyGraph::new(&edges);
    annotate_blocking(&mut units, &graph);
    assert_eq!(units[0].blocking, ["b", "c"]);
    assert!(units[1].blocking.is_empty());
  }
}
