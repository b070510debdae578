//! Deterministic step runner for dry runs and tests.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StepError;
use crate::runner::StepRunner;
use crate::step::{PipelineInput, QualityReport};

/// A [`StepRunner`] that fabricates plausible outputs without touching any
/// external tooling.
///
/// Outputs are derived from the unit id alone, so repeated runs over the
/// same plan produce identical artifacts.
#[derive(Debug, Clone, Default)]
pub struct SimulatedSteps {
  /// Artificial per-step latency, zero by default.
  delay: Duration,
  /// Units whose validation step fails, for exercising the error path.
  fail_validation: HashSet<String>,
}

impl SimulatedSteps {
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  pub fn failing_validation_for<I, S>(mut self, units: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.fail_validation = units.into_iter().map(Into::into).collect();
    self
  }

  async fn pause(&self) {
    if !self.delay.is_zero() {
      tokio::time::sleep(self.delay).await;
    }
  }
}

/// FNV-1a over the unit id. Cheap and stable across runs.
fn seed(unit_id: &str) -> u64 {
  unit_id
    .bytes()
    .fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
      (hash ^ byte as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

#[async_trait]
impl StepRunner for SimulatedSteps {
  async fn analyze(&self, input: &PipelineInput) -> Result<serde_json::Value, StepError> {
    self.pause().await;
    let seed = seed(&input.unit_id);
    Ok(serde_json::json!({
      "unit_id": input.unit_id,
      "path": input.path,
      "estimated_loc": 100 + (seed % 900),
      "complexity": (seed % 100) as f64 / 100.0,
    }))
  }

  async fn generate(
    &self,
    input: &PipelineInput,
    _analysis: &serde_json::Value,
  ) -> Result<serde_json::Value, StepError> {
    self.pause().await;
    let mut files = vec![format!("generated/{}.ts", input.unit_id)];
    if input.generate_tests {
      files.push(format!("generated/{}.test.ts", input.unit_id));
    }
    Ok(serde_json::json!({"files": files}))
  }

  async fn validate(
    &self,
    input: &PipelineInput,
    _generated: &serde_json::Value,
  ) -> Result<serde_json::Value, StepError> {
    self.pause().await;
    if self.fail_validation.contains(&input.unit_id) {
      return Err(StepError::new(format!(
        "validation failed for {}: simulated fault",
        input.unit_id
      )));
    }
    Ok(serde_json::json!({"passed": true}))
  }

  async fn quality_check(
    &self,
    input: &PipelineInput,
    _generated: &serde_json::Value,
  ) -> Result<QualityReport, StepError> {
    self.pause().await;
    // Scores land in [0.70, 0.99].
    let score = 0.70 + (seed(&input.unit_id) % 30) as f64 / 100.0;
    Ok(QualityReport {
      score,
      issues: Vec::new(),
    })
  }

  async fn publish(
    &self,
    input: &PipelineInput,
    _generated: &serde_json::Value,
  ) -> Result<serde_json::Value, StepError> {
    self.pause().await;
    Ok(serde_json::json!({"location": format!("deploy/{}", input.unit_id)}))
  }
}
