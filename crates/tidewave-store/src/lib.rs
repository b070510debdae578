//! Tidewave Store
//!
//! This crate provides the storage trait and implementations for migration
//! executions, pipeline steps, and the dispatch queue. Data is persisted to
//! SQLite; an in-memory implementation backs tests and dry runs.
//!
//! The [`Store`] trait defines operations for:
//! - Creating and updating execution records
//! - Recording pipeline step progress
//! - Managing dispatch queue records (retained after completion)

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::{
  ExecutionRecord, ExecutionStatus, QueueRecord, QueueStatus, StepRecord, StepStatus,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),
}

/// Storage trait for executions, steps, and queue records.
#[async_trait]
pub trait Store: Send + Sync {
  /// Create a new execution record.
  async fn create_execution(&self, execution: &ExecutionRecord) -> Result<(), Error>;

  /// Get an execution by ID.
  async fn get_execution(&self, execution_id: &str) -> Result<ExecutionRecord, Error>;

  /// Update the status of an execution, with optional output and error.
  async fn update_execution(
    &self,
    execution_id: &str,
    status: ExecutionStatus,
    output: Option<serde_json::Value>,
    error: Option<String>,
    completed_at: Option<DateTime<Utc>>,
  ) -> Result<(), Error>;

  /// List executions for a workflow, most recent first.
  async fn list_executions(&self, workflow_id: &str) -> Result<Vec<ExecutionRecord>, Error>;

  /// List executions for a migration unit, most recent first.
  async fn list_executions_for_unit(&self, unit_id: &str) -> Result<Vec<ExecutionRecord>, Error>;

  /// Record a pipeline step. Written before the step body runs.
  async fn create_step(&self, step: &StepRecord) -> Result<(), Error>;

  /// Update a step after it finishes.
  async fn update_step(&self, step: &StepRecord) -> Result<(), Error>;

  /// List steps for an execution in start order.
  async fn list_steps(&self, execution_id: &str) -> Result<Vec<StepRecord>, Error>;

  /// Insert a queue record.
  async fn enqueue(&self, record: &QueueRecord) -> Result<(), Error>;

  /// Fetch up to `limit` queued records in enqueue order.
  async fn next_queued(&self, limit: usize) -> Result<Vec<QueueRecord>, Error>;

  /// Mark a record dispatched and bump its attempt counter.
  async fn mark_dispatched(&self, message_id: &str) -> Result<(), Error>;

  /// Terminal transition for a queue record. The record is kept.
  async fn mark_finished(
    &self,
    message_id: &str,
    status: QueueStatus,
    error: Option<String>,
  ) -> Result<(), Error>;

  /// Re-queue a dispatched record that failed with attempts remaining.
  async fn requeue(&self, message_id: &str, error: Option<String>) -> Result<(), Error>;

  /// List every queue record for a unit, including finished ones.
  async fn list_queue_for_unit(&self, unit_id: &str) -> Result<Vec<QueueRecord>, Error>;
}
