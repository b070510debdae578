use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

/// Status of a migration execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ExecutionStatus {
  Running,
  Paused,
  Succeeded,
  Failed,
  Cancelled,
  Terminated,
  TimedOut,
}

impl ExecutionStatus {
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      ExecutionStatus::Succeeded
        | ExecutionStatus::Failed
        | ExecutionStatus::Cancelled
        | ExecutionStatus::Terminated
        | ExecutionStatus::TimedOut
    )
  }
}

/// Status of one pipeline step within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum StepStatus {
  Pending,
  Running,
  Succeeded,
  Failed,
}

/// Status of a queue record. Completed and failed records are retained for
/// audit rather than deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum QueueStatus {
  Queued,
  Dispatched,
  Completed,
  Failed,
}

/// A migration execution as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ExecutionRecord {
  pub execution_id: String,
  pub workflow_id: String,
  /// Migration unit this execution is processing.
  pub unit_id: String,
  pub status: ExecutionStatus,
  pub input: Json<serde_json::Value>,
  pub output: Option<Json<serde_json::Value>>,
  pub error: Option<String>,
  pub started_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
}

/// A pipeline step record, persisted before the step runs so progress
/// survives a crash mid-step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct StepRecord {
  pub step_id: String,
  pub execution_id: String,
  /// Step name, e.g. "analyze" or "quality_check".
  pub step: String,
  /// Progress milestone reached when this step starts, 0-100.
  pub percent: i32,
  pub status: StepStatus,
  pub started_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
  pub error: Option<String>,
}

/// A dispatch queue message as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct QueueRecord {
  pub message_id: String,
  pub unit_id: String,
  pub path: String,
  pub status: QueueStatus,
  pub attempts: i32,
  pub max_attempts: i32,
  pub metadata: Json<serde_json::Value>,
  pub error: Option<String>,
  pub enqueued_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl QueueRecord {
  pub fn attempts_exhausted(&self) -> bool {
    self.attempts >= self.max_attempts
  }
}
