use serde::{Deserialize, Serialize};

/// Priority of a migration unit.
///
/// Ordering is derived so that `Low < Medium < High < Critical`, which lets
/// the planner take the max priority across a wave's members.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
  Low,
  #[default]
  Medium,
  High,
  Critical,
}

impl Priority {
  /// Weight used by the composite score: critical=4, high=3, medium=2, low=1.
  pub fn weight(self) -> f64 {
    match self {
      Priority::Critical => 4.0,
      Priority::High => 3.0,
      Priority::Medium => 2.0,
      Priority::Low => 1.0,
    }
  }
}

/// Search-traffic impact classifier for a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SeoImpact {
  High,
  Medium,
  #[default]
  Low,
  None,
}

impl SeoImpact {
  /// Score factor: high=1.0, medium=0.6, everything else 0.3.
  pub fn factor(self) -> f64 {
    match self {
      SeoImpact::High => 1.0,
      SeoImpact::Medium => 0.6,
      SeoImpact::Low | SeoImpact::None => 0.3,
    }
  }
}

/// Business impact classifier for a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BusinessImpact {
  Critical,
  High,
  #[default]
  Medium,
  Low,
}

impl BusinessImpact {
  /// Score factor: critical=1.0, high=0.8, everything else 0.5.
  pub fn factor(self) -> f64 {
    match self {
      BusinessImpact::Critical => 1.0,
      BusinessImpact::High => 0.8,
      BusinessImpact::Medium | BusinessImpact::Low => 0.5,
    }
  }
}

/// Lifecycle status of a migration unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
  #[default]
  Pending,
  InProgress,
  Completed,
  Blocked,
}

impl UnitStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, UnitStatus::Completed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn priority_ordering_matches_weight() {
    assert!(Priority::Critical > Priority::High);
    assert!(Priority::High > Priority::Medium);
    assert!(Priority::Medium > Priority::Low);
    assert!(Priority::Critical.weight() > Priority::Low.weight());
  }

  #[test]
  fn enums_round_trip_snake_case() {
    let json = serde_json::to_string(&Priority::Critical).unwrap();
    assert_eq!(json, "\"critical\"");
    let back: Priority = serde_json::from_str(&json).unwrap();
    assert_eq!(back, Priority::Critical);

    let json = serde_json::to_string(&UnitStatus::InProgress).unwrap();
    assert_eq!(json, "\"in_progress\"");
  }
}
