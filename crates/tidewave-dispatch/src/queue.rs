//! The durable work queue the live dispatcher hands units to.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use tidewave_store::{QueueRecord, QueueStatus, Store};

use crate::error::DispatchError;

/// Attempt budget applied to every queued message.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// One unit hand-off placed on the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
  pub message_id: String,
  pub unit_id: String,
  pub path: String,
  pub timestamp: DateTime<Utc>,
  pub metadata: serde_json::Value,
}

impl QueueMessage {
  pub fn new(unit_id: impl Into<String>, path: impl Into<String>) -> Self {
    Self {
      message_id: uuid::Uuid::new_v4().to_string(),
      unit_id: unit_id.into(),
      path: path.into(),
      timestamp: Utc::now(),
      metadata: serde_json::json!({}),
    }
  }
}

/// Destination for dispatched units.
#[async_trait]
pub trait WorkQueue: Send + Sync {
  async fn enqueue(&self, message: &QueueMessage) -> Result<(), DispatchError>;
}

/// A [`WorkQueue`] persisting messages as store queue records.
///
/// Records survive completion; the worker flips their status instead of
/// deleting them, so the queue doubles as a dispatch audit log.
pub struct StoreQueue {
  store: Arc<dyn Store>,
  max_attempts: u32,
}

impl StoreQueue {
  pub fn new(store: Arc<dyn Store>) -> Self {
    Self {
      store,
      max_attempts: DEFAULT_MAX_ATTEMPTS,
    }
  }
}

#[async_trait]
impl WorkQueue for StoreQueue {
  async fn enqueue(&self, message: &QueueMessage) -> Result<(), DispatchError> {
    self
      .store
      .enqueue(&QueueRecord {
        message_id: message.message_id.clone(),
        unit_id: message.unit_id.clone(),
        path: message.path.clone(),
        status: QueueStatus::Queued,
        attempts: 0,
        max_attempts: self.max_attempts as i32,
        metadata: Json(message.metadata.clone()),
        error: None,
        enqueued_at: message.timestamp,
        updated_at: message.timestamp,
      })
      .await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tidewave_store::MemoryStore;

  #[tokio::test]
  async fn enqueue_lands_a_queued_record() {
    let store = Arc::new(MemoryStore::new());
    let queue = StoreQueue::new(store.clone());

    queue
      .enqueue(&QueueMessage::new("cart", "src/cart/panier.php"))
      .await
      .unwrap();

    let records = store.list_queue_for_unit("cart").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, QueueStatus::Queued);
    assert_eq!(records[0].max_attempts, 3);
  }
}
