use thiserror::Error;

/// Error type for backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
  /// A workflow definition failed pre-deploy validation.
  #[error("invalid workflow definition: {0}")]
  Validation(String),

  /// The referenced workflow is not deployed.
  #[error("workflow not found: {0}")]
  WorkflowNotFound(String),

  /// The referenced execution does not exist.
  #[error("execution not found: {0}")]
  ExecutionNotFound(String),

  /// The execution input could not be parsed.
  #[error("invalid execution input: {0}")]
  InvalidInput(#[from] serde_json::Error),

  /// A cron expression failed to parse.
  #[error("invalid cron expression {expr:?}: {source}")]
  InvalidCron {
    expr: String,
    #[source]
    source: cron::error::Error,
  },

  /// The referenced schedule does not exist.
  #[error("schedule not found: {0}")]
  ScheduleNotFound(String),

  /// A storage operation failed.
  #[error(transparent)]
  Store(#[from] tidewave_store::Error),
}
