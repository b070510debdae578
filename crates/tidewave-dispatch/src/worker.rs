//! Worker that drains the queue into backend executions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tidewave_backend::{
  ExecuteOptions, ExecutionUpdate, JobStatus, OrchestrationBackend,
};
use tidewave_store::{QueueRecord, QueueStatus, Store};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::dispatcher::{CompletionEvent, CompletionStatus};

/// Configuration for the queue worker.
#[derive(Debug, Clone)]
pub struct QueueWorkerConfig {
  /// Queue records pulled per poll.
  pub batch_size: usize,
  pub poll_interval: Duration,
}

impl Default for QueueWorkerConfig {
  fn default() -> Self {
    Self {
      batch_size: 10,
      poll_interval: Duration::from_millis(250),
    }
  }
}

/// Pulls queued messages, starts backend executions for them, and reports
/// terminal outcomes back to the dispatcher as completion events.
///
/// A message whose execution fails to start is re-queued until its attempt
/// budget runs out, then marked failed. Finished records are retained.
pub struct QueueWorker {
  store: Arc<dyn Store>,
  backend: Arc<dyn OrchestrationBackend>,
  workflow_id: String,
  events: mpsc::UnboundedSender<CompletionEvent>,
  config: QueueWorkerConfig,
}

impl QueueWorker {
  pub fn new(
    store: Arc<dyn Store>,
    backend: Arc<dyn OrchestrationBackend>,
    workflow_id: impl Into<String>,
    events: mpsc::UnboundedSender<CompletionEvent>,
    config: QueueWorkerConfig,
  ) -> Self {
    Self {
      store,
      backend,
      workflow_id: workflow_id.into(),
      events,
      config,
    }
  }

  /// Run until cancelled, polling the queue and listening for execution
  /// updates from the backend.
  #[instrument(name = "queue_worker", skip_all, fields(workflow_id = %self.workflow_id))]
  pub async fn run(
    mut self,
    mut updates: mpsc::UnboundedReceiver<ExecutionUpdate>,
    cancel: CancellationToken,
  ) {
    // Execution id -> the queue record it is running for.
    let mut pending: HashMap<String, QueueRecord> = HashMap::new();

    loop {
      tokio::select! {
        () = cancel.cancelled() => {
          info!(pending = pending.len(), "queue worker stopped");
          return;
        }
        Some(update) = updates.recv() => {
          if update.status.is_terminal() {
            self.settle(&mut pending, update).await;
          }
        }
        () = tokio::time::sleep(self.config.poll_interval) => {
          self.pull_batch(&mut pending).await;
        }
      }
    }
  }

  async fn pull_batch(&mut self, pending: &mut HashMap<String, QueueRecord>) {
    let records = match self.store.next_queued(self.config.batch_size).await {
      Ok(records) => records,
      Err(err) => {
        warn!(error = %err, "failed to poll queue");
        return;
      }
    };

    for record in records {
      if let Err(err) = self.store.mark_dispatched(&record.message_id).await {
        warn!(message_id = %record.message_id, error = %err, "failed to mark dispatched");
        continue;
      }

      let input = serde_json::json!({
        "unit_id": record.unit_id,
        "path": record.path,
      });
      match self
        .backend
        .execute(&self.workflow_id, input, ExecuteOptions::default())
        .await
      {
        Ok(handle) => {
          info!(
            message_id = %record.message_id,
            execution_id = %handle.execution_id,
            unit_id = %record.unit_id,
            "execution_started"
          );
          pending.insert(handle.execution_id, record);
        }
        Err(err) => self.handle_start_failure(record, err.to_string()).await,
      }
    }
  }

  /// A start failure consumes one attempt; the record goes back on the
  /// queue until its budget runs out.
  async fn handle_start_failure(&self, record: QueueRecord, error: String) {
    // mark_dispatched already bumped the attempt counter.
    let attempts_used = record.attempts + 1;
    if attempts_used >= record.max_attempts {
      warn!(
        message_id = %record.message_id,
        unit_id = %record.unit_id,
        attempts = attempts_used,
        error = %error,
        "attempt budget exhausted"
      );
      if let Err(err) = self
        .store
        .mark_finished(&record.message_id, QueueStatus::Failed, Some(error.clone()))
        .await
      {
        warn!(message_id = %record.message_id, error = %err, "failed to mark record failed");
      }
      let _ = self.events.send(CompletionEvent {
        unit_id: record.unit_id,
        status: CompletionStatus::Failed,
        error: Some(error),
      });
    } else if let Err(err) = self.store.requeue(&record.message_id, Some(error)).await {
      warn!(message_id = %record.message_id, error = %err, "failed to requeue");
    }
  }

  async fn settle(
    &self,
    pending: &mut HashMap<String, QueueRecord>,
    update: ExecutionUpdate,
  ) {
    let Some(record) = pending.remove(&update.execution_id) else {
      // An execution this worker did not start, for example a child
      // workflow. Not ours to report.
      return;
    };

    let (queue_status, completion) = match update.status {
      JobStatus::Completed => (QueueStatus::Completed, CompletionStatus::Completed),
      JobStatus::Canceled | JobStatus::Terminated => {
        (QueueStatus::Failed, CompletionStatus::Cancelled)
      }
      JobStatus::TimedOut => (QueueStatus::Failed, CompletionStatus::TimedOut),
      // Unknown never reads as success.
      JobStatus::Failed | JobStatus::Unknown | JobStatus::Running => {
        (QueueStatus::Failed, CompletionStatus::Failed)
      }
    };

    if let Err(err) = self
      .store
      .mark_finished(&record.message_id, queue_status, update.error.clone())
      .await
    {
      warn!(message_id = %record.message_id, error = %err, "failed to finish record");
    }
    let _ = self.events.send(CompletionEvent {
      unit_id: record.unit_id,
      status: completion,
      error: update.error,
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::queue::{QueueMessage, StoreQueue, WorkQueue};
  use tidewave_backend::{LocalBackend, LocalBackendConfig, TaskDefinition, WorkflowDefinition};
  use tidewave_pipeline::SimulatedSteps;
  use tidewave_store::MemoryStore;

  async fn harness(
    steps: SimulatedSteps,
  ) -> (
    Arc<MemoryStore>,
    LocalBackend,
    mpsc::UnboundedReceiver<CompletionEvent>,
    CancellationToken,
  ) {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let backend = LocalBackend::connect(
      store.clone(),
      Arc::new(steps),
      LocalBackendConfig::default(),
    )
    .await
    .unwrap();
    backend
      .deploy(WorkflowDefinition::new(
        "unit-migration",
        vec![TaskDefinition {
          id: "pipeline".to_string(),
          depends_on: vec![],
          params: serde_json::Value::Null,
        }],
      ))
      .await
      .unwrap();

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let worker = QueueWorker::new(
      store.clone(),
      Arc::new(backend.clone()),
      "unit-migration",
      events_tx,
      QueueWorkerConfig {
        batch_size: 10,
        poll_interval: Duration::from_millis(10),
      },
    );
    tokio::spawn(worker.run(backend.subscribe(), cancel.clone()));
    (store, backend, events_rx, cancel)
  }

  #[tokio::test]
  async fn queued_units_run_to_completion() {
    let (store, _backend, mut events, cancel) = harness(SimulatedSteps::default()).await;
    let queue = StoreQueue::new(store.clone());
    queue
      .enqueue(&QueueMessage::new("cart", "src/cart/panier.php"))
      .await
      .unwrap();

    let event = events.recv().await.unwrap();
    assert_eq!(event.unit_id, "cart");
    assert_eq!(event.status, CompletionStatus::Completed);

    let records = store.list_queue_for_unit("cart").await.unwrap();
    assert_eq!(records[0].status, QueueStatus::Completed);
    cancel.cancel();
  }

  #[tokio::test]
  async fn failed_executions_report_failure_with_the_cause() {
    let (store, _backend, mut events, cancel) =
      harness(SimulatedSteps::default().failing_validation_for(["cart"])).await;
    let queue = StoreQueue::new(store.clone());
    queue
      .enqueue(&QueueMessage::new("cart", "src/cart/panier.php"))
      .await
      .unwrap();

    let event = events.recv().await.unwrap();
    assert_eq!(event.status, CompletionStatus::Failed);
    assert!(event.error.unwrap().contains("simulated fault"));

    let records = store.list_queue_for_unit("cart").await.unwrap();
    assert_eq!(records[0].status, QueueStatus::Failed);
    cancel.cancel();
  }
}
