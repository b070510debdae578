use serde::{Deserialize, Serialize};

/// Steps of the per-unit migration pipeline, in execution order.
///
/// `Publish` only runs when requested and when the quality score clears the
/// configured threshold; `Error` is terminal and reachable from any step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStep {
  Init,
  Analyze,
  Generate,
  Validate,
  QualityCheck,
  Publish,
  Complete,
  Error,
}

impl MigrationStep {
  /// Progress milestone persisted when this step starts.
  pub fn milestone(self) -> u8 {
    match self {
      MigrationStep::Init => 10,
      MigrationStep::Analyze => 30,
      MigrationStep::Generate => 50,
      MigrationStep::Validate => 70,
      MigrationStep::QualityCheck => 90,
      MigrationStep::Publish => 95,
      MigrationStep::Complete => 100,
      MigrationStep::Error => 100,
    }
  }

  /// Stable name used in logs and persisted step records.
  pub fn name(self) -> &'static str {
    match self {
      MigrationStep::Init => "init",
      MigrationStep::Analyze => "analyze",
      MigrationStep::Generate => "generate",
      MigrationStep::Validate => "validate",
      MigrationStep::QualityCheck => "quality_check",
      MigrationStep::Publish => "publish",
      MigrationStep::Complete => "complete",
      MigrationStep::Error => "error",
    }
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, MigrationStep::Complete | MigrationStep::Error)
  }
}

impl std::fmt::Display for MigrationStep {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.name())
  }
}

/// Input for one pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineInput {
  pub unit_id: String,
  pub path: String,
  /// Attempt to publish when the quality score clears the threshold.
  #[serde(default)]
  pub publish: bool,
  #[serde(default = "default_quality_threshold")]
  pub quality_threshold: f64,
  #[serde(default)]
  pub generate_tests: bool,
}

fn default_quality_threshold() -> f64 {
  0.8
}

impl PipelineInput {
  pub fn new(unit_id: impl Into<String>, path: impl Into<String>) -> Self {
    Self {
      unit_id: unit_id.into(),
      path: path.into(),
      publish: false,
      quality_threshold: default_quality_threshold(),
      generate_tests: false,
    }
  }
}

/// Quality-check verdict for a generated artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
  /// Normalized score in [0, 1].
  pub score: f64,
  #[serde(default)]
  pub issues: Vec<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn milestones_are_monotone_along_the_happy_path() {
    let path = [
      MigrationStep::Init,
      MigrationStep::Analyze,
      MigrationStep::Generate,
      MigrationStep::Validate,
      MigrationStep::QualityCheck,
      MigrationStep::Publish,
      MigrationStep::Complete,
    ];
    for pair in path.windows(2) {
      assert!(pair[0].milestone() < pair[1].milestone());
    }
    assert_eq!(MigrationStep::Complete.milestone(), 100);
  }

  #[test]
  fn input_deserializes_with_defaults() {
    let input: PipelineInput =
      serde_json::from_str(r#"{"unit_id": "cart", "path": "src/cart/panier.php"}"#).unwrap();
    assert!(!input.publish);
    assert_eq!(input.quality_threshold, 0.8);
  }
}
