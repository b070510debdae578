use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::types::Json;

use crate::{Error, ExecutionRecord, ExecutionStatus, QueueRecord, QueueStatus, StepRecord, Store};

/// SQLite-based store implementation.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Connect to a SQLite database, creating the file if needed.
  pub async fn connect(url: &str) -> Result<Self, Error> {
    let options = sqlx::sqlite::SqliteConnectOptions::new()
      .filename(url.trim_start_matches("sqlite://"))
      .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;
    Ok(Self::new(pool))
  }

  /// Create the schema if it does not exist. Safe to call on every start.
  pub async fn init_schema(&self) -> Result<(), Error> {
    sqlx::query(
      r#"
            CREATE TABLE IF NOT EXISTS executions (
                execution_id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                unit_id TEXT NOT NULL,
                status TEXT NOT NULL,
                input TEXT NOT NULL,
                output TEXT,
                error TEXT,
                started_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS execution_steps (
                step_id TEXT PRIMARY KEY,
                execution_id TEXT NOT NULL,
                step TEXT NOT NULL,
                percent INTEGER NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                error TEXT
            );

            CREATE TABLE IF NOT EXISTS queue_records (
                message_id TEXT PRIMARY KEY,
                unit_id TEXT NOT NULL,
                path TEXT NOT NULL,
                status TEXT NOT NULL,
                attempts INTEGER NOT NULL,
                max_attempts INTEGER NOT NULL,
                metadata TEXT NOT NULL,
                error TEXT,
                enqueued_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_executions_workflow
                ON executions (workflow_id, started_at);
            CREATE INDEX IF NOT EXISTS idx_executions_unit
                ON executions (unit_id, started_at);
            CREATE INDEX IF NOT EXISTS idx_steps_execution
                ON execution_steps (execution_id, started_at);
            CREATE INDEX IF NOT EXISTS idx_queue_status
                ON queue_records (status, enqueued_at);
            "#,
    )
    .execute(&self.pool)
    .await?;

    Ok(())
  }
}

#[async_trait]
impl Store for SqliteStore {
  async fn create_execution(&self, execution: &ExecutionRecord) -> Result<(), Error> {
    sqlx::query(
            r#"
            INSERT INTO executions (execution_id, workflow_id, unit_id, status, input, output, error, started_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&execution.execution_id)
        .bind(&execution.workflow_id)
        .bind(&execution.unit_id)
        .bind(execution.status)
        .bind(&execution.input)
        .bind(&execution.output)
        .bind(&execution.error)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .execute(&self.pool)
        .await?;

    Ok(())
  }

  async fn get_execution(&self, execution_id: &str) -> Result<ExecutionRecord, Error> {
    sqlx::query_as(
      r#"
            SELECT execution_id, workflow_id, unit_id, status, input, output, error, started_at, completed_at
            FROM executions
            WHERE execution_id = ?
            "#,
    )
    .bind(execution_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(execution_id.to_string()))
  }

  async fn update_execution(
    &self,
    execution_id: &str,
    status: ExecutionStatus,
    output: Option<serde_json::Value>,
    error: Option<String>,
    completed_at: Option<DateTime<Utc>>,
  ) -> Result<(), Error> {
    sqlx::query(
      r#"
            UPDATE executions
            SET status = ?, output = COALESCE(?, output), error = COALESCE(?, error), completed_at = ?
            WHERE execution_id = ?
            "#,
    )
    .bind(status)
    .bind(output.map(Json))
    .bind(error)
    .bind(completed_at)
    .bind(execution_id)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn list_executions(&self, workflow_id: &str) -> Result<Vec<ExecutionRecord>, Error> {
    Ok(
      sqlx::query_as(
        r#"
            SELECT execution_id, workflow_id, unit_id, status, input, output, error, started_at, completed_at
            FROM executions
            WHERE workflow_id = ?
            ORDER BY started_at DESC
            "#,
      )
      .bind(workflow_id)
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn list_executions_for_unit(&self, unit_id: &str) -> Result<Vec<ExecutionRecord>, Error> {
    Ok(
      sqlx::query_as(
        r#"
            SELECT execution_id, workflow_id, unit_id, status, input, output, error, started_at, completed_at
            FROM executions
            WHERE unit_id = ?
            ORDER BY started_at DESC
            "#,
      )
      .bind(unit_id)
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn create_step(&self, step: &StepRecord) -> Result<(), Error> {
    sqlx::query(
            r#"
            INSERT INTO execution_steps (step_id, execution_id, step, percent, status, started_at, completed_at, error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&step.step_id)
        .bind(&step.execution_id)
        .bind(&step.step)
        .bind(step.percent)
        .bind(step.status)
        .bind(step.started_at)
        .bind(step.completed_at)
        .bind(&step.error)
        .execute(&self.pool)
        .await?;

    Ok(())
  }

  async fn update_step(&self, step: &StepRecord) -> Result<(), Error> {
    sqlx::query(
      r#"
            UPDATE execution_steps
            SET status = ?, percent = ?, completed_at = ?, error = ?
            WHERE step_id = ?
            "#,
    )
    .bind(step.status)
    .bind(step.percent)
    .bind(step.completed_at)
    .bind(&step.error)
    .bind(&step.step_id)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn list_steps(&self, execution_id: &str) -> Result<Vec<StepRecord>, Error> {
    Ok(
      sqlx::query_as(
        r#"
            SELECT step_id, execution_id, step, percent, status, started_at, completed_at, error
            FROM execution_steps
            WHERE execution_id = ?
            ORDER BY started_at ASC
            "#,
      )
      .bind(execution_id)
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn enqueue(&self, record: &QueueRecord) -> Result<(), Error> {
    sqlx::query(
            r#"
            INSERT INTO queue_records (message_id, unit_id, path, status, attempts, max_attempts, metadata, error, enqueued_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.message_id)
        .bind(&record.unit_id)
        .bind(&record.path)
        .bind(record.status)
        .bind(record.attempts)
        .bind(record.max_attempts)
        .bind(&record.metadata)
        .bind(&record.error)
        .bind(record.enqueued_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

    Ok(())
  }

  async fn next_queued(&self, limit: usize) -> Result<Vec<QueueRecord>, Error> {
    Ok(
      sqlx::query_as(
        r#"
            SELECT message_id, unit_id, path, status, attempts, max_attempts, metadata, error, enqueued_at, updated_at
            FROM queue_records
            WHERE status = 'queued'
            ORDER BY enqueued_at ASC
            LIMIT ?
            "#,
      )
      .bind(limit as i64)
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn mark_dispatched(&self, message_id: &str) -> Result<(), Error> {
    let result = sqlx::query(
      r#"
            UPDATE queue_records
            SET status = 'dispatched', attempts = attempts + 1, updated_at = ?
            WHERE message_id = ?
            "#,
    )
    .bind(Utc::now())
    .bind(message_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(message_id.to_string()));
    }
    Ok(())
  }

  async fn mark_finished(
    &self,
    message_id: &str,
    status: QueueStatus,
    error: Option<String>,
  ) -> Result<(), Error> {
    let result = sqlx::query(
      r#"
            UPDATE queue_records
            SET status = ?, error = ?, updated_at = ?
            WHERE message_id = ?
            "#,
    )
    .bind(status)
    .bind(error)
    .bind(Utc::now())
    .bind(message_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(message_id.to_string()));
    }
    Ok(())
  }

  async fn requeue(&self, message_id: &str, error: Option<String>) -> Result<(), Error> {
    let result = sqlx::query(
      r#"
            UPDATE queue_records
            SET status = 'queued', error = ?, updated_at = ?
            WHERE message_id = ?
            "#,
    )
    .bind(error)
    .bind(Utc::now())
    .bind(message_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(message_id.to_string()));
    }
    Ok(())
  }

  async fn list_queue_for_unit(&self, unit_id: &str) -> Result<Vec<QueueRecord>, Error> {
    Ok(
      sqlx::query_as(
        r#"
            SELECT message_id, unit_id, path, status, attempts, max_attempts, metadata, error, enqueued_at, updated_at
            FROM queue_records
            WHERE unit_id = ?
            ORDER BY enqueued_at ASC
            "#,
      )
      .bind(unit_id)
      .fetch_all(&self.pool)
      .await?,
    )
  }
}
