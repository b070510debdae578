use thiserror::Error;

use crate::step::MigrationStep;

/// Failure reported by a [`StepRunner`](crate::StepRunner) implementation.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct StepError(String);

impl StepError {
  pub fn new(message: impl Into<String>) -> Self {
    Self(message.into())
  }
}

/// Error type for pipeline executions.
#[derive(Debug, Error)]
pub enum PipelineError {
  /// A step failed; the original runner message is preserved verbatim.
  #[error("step {step} failed: {source}")]
  Step {
    step: MigrationStep,
    #[source]
    source: StepError,
  },

  /// The execution was cancelled between steps.
  #[error("execution cancelled")]
  Cancelled,
}
