use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;

use crate::{Error, ExecutionRecord, ExecutionStatus, QueueRecord, QueueStatus, StepRecord, Store};

/// In-memory store for tests and dry runs. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
  inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
  executions: HashMap<String, ExecutionRecord>,
  steps: Vec<StepRecord>,
  queue: HashMap<String, QueueRecord>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn create_execution(&self, execution: &ExecutionRecord) -> Result<(), Error> {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner
      .executions
      .insert(execution.execution_id.clone(), execution.clone());
    Ok(())
  }

  async fn get_execution(&self, execution_id: &str) -> Result<ExecutionRecord, Error> {
    let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner
      .executions
      .get(execution_id)
      .cloned()
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
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    let record = inner
      .executions
      .get_mut(execution_id)
      .ok_or_else(|| Error::NotFound(execution_id.to_string()))?;
    record.status = status;
    if let Some(output) = output {
      record.output = Some(Json(output));
    }
    if let Some(error) = error {
      record.error = Some(error);
    }
    record.completed_at = completed_at;
    Ok(())
  }

  async fn list_executions(&self, workflow_id: &str) -> Result<Vec<ExecutionRecord>, Error> {
    let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    let mut found: Vec<ExecutionRecord> = inner
      .executions
      .values()
      .filter(|e| e.workflow_id == workflow_id)
      .cloned()
      .collect();
    found.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    Ok(found)
  }

  async fn list_executions_for_unit(&self, unit_id: &str) -> Result<Vec<ExecutionRecord>, Error> {
    let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    let mut found: Vec<ExecutionRecord> = inner
      .executions
      .values()
      .filter(|e| e.unit_id == unit_id)
      .cloned()
      .collect();
    found.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    Ok(found)
  }

  async fn create_step(&self, step: &StepRecord) -> Result<(), Error> {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner.steps.push(step.clone());
    Ok(())
  }

  async fn update_step(&self, step: &StepRecord) -> Result<(), Error> {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    let found = inner
      .steps
      .iter_mut()
      .find(|s| s.step_id == step.step_id)
      .ok_or_else(|| Error::NotFound(step.step_id.clone()))?;
    *found = step.clone();
    Ok(())
  }

  async fn list_steps(&self, execution_id: &str) -> Result<Vec<StepRecord>, Error> {
    let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    let mut found: Vec<StepRecord> = inner
      .steps
      .iter()
      .filter(|s| s.execution_id == execution_id)
      .cloned()
      .collect();
    found.sort_by(|a, b| a.started_at.cmp(&b.started_at));
    Ok(found)
  }

  async fn enqueue(&self, record: &QueueRecord) -> Result<(), Error> {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner.queue.insert(record.message_id.clone(), record.clone());
    Ok(())
  }

  async fn next_queued(&self, limit: usize) -> Result<Vec<QueueRecord>, Error> {
    let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    let mut found: Vec<QueueRecord> = inner
      .queue
      .values()
      .filter(|r| r.status == QueueStatus::Queued)
      .cloned()
      .collect();
    found.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at));
    found.truncate(limit);
    Ok(found)
  }

  async fn mark_dispatched(&self, message_id: &str) -> Result<(), Error> {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    let record = inner
      .queue
      .get_mut(message_id)
      .ok_or_else(|| Error::NotFound(message_id.to_string()))?;
    record.status = QueueStatus::Dispatched;
    record.attempts += 1;
    record.updated_at = Utc::now();
    Ok(())
  }

  async fn mark_finished(
    &self,
    message_id: &str,
    status: QueueStatus,
    error: Option<String>,
  ) -> Result<(), Error> {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    let record = inner
      .queue
      .get_mut(message_id)
      .ok_or_else(|| Error::NotFound(message_id.to_string()))?;
    record.status = status;
    record.error = error;
    record.updated_at = Utc::now();
    Ok(())
  }

  async fn requeue(&self, message_id: &str, error: Option<String>) -> Result<(), Error> {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    let record = inner
      .queue
      .get_mut(message_id)
      .ok_or_else(|| Error::NotFound(message_id.to_string()))?;
    record.status = QueueStatus::Queued;
    record.error = error;
    record.updated_at = Utc::now();
    Ok(())
  }

  async fn list_queue_for_unit(&self, unit_id: &str) -> Result<Vec<QueueRecord>, Error> {
    let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    let mut found: Vec<QueueRecord> = inner
      .queue
      .values()
      .filter(|r| r.unit_id == unit_id)
      .cloned()
      .collect();
    found.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at));
    Ok(found)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use sqlx::types::Json;

  #[tokio::test]
  async fn memory_store_matches_trait_semantics() {
    let store = MemoryStore::new();
    let record = QueueRecord {
      message_id: "m1".to_string(),
      unit_id: "cart".to_string(),
      path: "src/cart/panier.php".to_string(),
      status: QueueStatus::Queued,
      attempts: 0,
      max_attempts: 3,
      metadata: Json(serde_json::json!({})),
      error: None,
      enqueued_at: Utc::now(),
      updated_at: Utc::now(),
    };
    store.enqueue(&record).await.unwrap();
    store.mark_dispatched("m1").await.unwrap();
    assert!(store.next_queued(10).await.unwrap().is_empty());

    store.requeue("m1", None).await.unwrap();
    let queued = store.next_queued(10).await.unwrap();
    assert_eq!(queued[0].attempts, 1);

    let err = store.get_execution("missing").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
  }
}
