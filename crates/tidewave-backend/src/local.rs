//! In-process durable backend.
//!
//! Each execution runs its pipeline on a tokio task. Every state transition
//! is persisted through the store first, so status queries keep working
//! after a restart even though in-flight executions do not survive one.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use tidewave_pipeline::{
  ChannelSink, Pipeline, PipelineError, PipelineInput, ProgressEvent, StepRunner,
};
use tidewave_store::{
  Error as StoreError, ExecutionRecord, ExecutionStatus, StepRecord, StepStatus, Store,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::backend::{
  BatchOperation, BatchOutcome, ExecuteOptions, ExecutionHandle, OrchestrationBackend,
  ResetOptions, ScheduleOptions,
};
use crate::definition::WorkflowDefinition;
use crate::error::BackendError;
use crate::schedule::{ScheduleEntry, ScheduleInfo};
use crate::status::{HealthStatus, JobStatus};

/// Signal name a running execution interprets as "start this workflow".
pub const START_CHILD_WORKFLOW: &str = "start_child_workflow";

/// A named signal delivered to a running execution.
#[derive(Debug, Clone)]
pub struct Signal {
  pub name: String,
  pub payload: serde_json::Value,
}

/// Status update pushed to subscribers on start and on completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionUpdate {
  pub execution_id: String,
  pub workflow_id: String,
  pub unit_id: String,
  pub status: JobStatus,
  pub error: Option<String>,
}

/// Configuration for [`LocalBackend`].
#[derive(Debug, Clone)]
pub struct LocalBackendConfig {
  /// Fan-out bound for [`execute_batch`](OrchestrationBackend::execute_batch).
  pub batch_concurrency: usize,
}

impl Default for LocalBackendConfig {
  fn default() -> Self {
    Self {
      batch_concurrency: 10,
    }
  }
}

struct RunningExecution {
  cancel: CancellationToken,
  signals: mpsc::UnboundedSender<Signal>,
}

pub(crate) struct Inner {
  store: Arc<dyn Store>,
  steps: Arc<dyn StepRunner>,
  config: LocalBackendConfig,
  workflows: Mutex<HashMap<String, WorkflowDefinition>>,
  running: Mutex<HashMap<String, RunningExecution>>,
  schedules: Mutex<HashMap<String, ScheduleEntry>>,
  subscribers: Mutex<Vec<mpsc::UnboundedSender<ExecutionUpdate>>>,
}

/// The in-process orchestration backend.
#[derive(Clone)]
pub struct LocalBackend {
  inner: Arc<Inner>,
}

impl LocalBackend {
  /// Create the backend, probing the store first. An unreachable store at
  /// startup is fatal.
  pub async fn connect(
    store: Arc<dyn Store>,
    steps: Arc<dyn StepRunner>,
    config: LocalBackendConfig,
  ) -> Result<Self, BackendError> {
    probe_store(store.as_ref()).await?;
    Ok(Self {
      inner: Arc::new(Inner {
        store,
        steps,
        config,
        workflows: Mutex::new(HashMap::new()),
        running: Mutex::new(HashMap::new()),
        schedules: Mutex::new(HashMap::new()),
        subscribers: Mutex::new(Vec::new()),
      }),
    })
  }

  /// Snapshot of every registered schedule, ordered by schedule id.
  pub fn list_schedules(&self) -> Vec<ScheduleInfo> {
    let schedules = self
      .inner
      .schedules
      .lock()
      .unwrap_or_else(|e| e.into_inner());
    let mut out: Vec<_> = schedules.values().map(ScheduleEntry::info).collect();
    out.sort_by(|a, b| a.schedule_id.cmp(&b.schedule_id));
    out
  }

  /// Subscribe to execution updates. Each subscriber receives every start
  /// and completion event from the moment of subscription.
  pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ExecutionUpdate> {
    let (sender, receiver) = mpsc::unbounded_channel();
    self
      .inner
      .subscribers
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push(sender);
    receiver
  }
}

async fn probe_store(store: &dyn Store) -> Result<(), BackendError> {
  match store.get_execution("__startup_probe__").await {
    Ok(_) | Err(StoreError::NotFound(_)) => Ok(()),
    Err(source) => Err(BackendError::Store(source)),
  }
}

fn notify(inner: &Inner, update: ExecutionUpdate) {
  let mut subscribers = inner.subscribers.lock().unwrap_or_else(|e| e.into_inner());
  subscribers.retain(|sender| sender.send(update.clone()).is_ok());
}

/// Current status of an execution, or None when it cannot be read.
pub(crate) async fn execution_status(
  inner: &Arc<Inner>,
  execution_id: &str,
) -> Option<JobStatus> {
  inner
    .store
    .get_execution(execution_id)
    .await
    .ok()
    .map(|record| JobStatus::from(record.status))
}

/// Start one execution: persist the record, register the running entry, and
/// spawn the driver task.
///
/// Returns a boxed future so the recursive cycle (driver -> signal -> start)
/// has a concrete `Send` type the compiler can close over.
pub(crate) fn start_execution<'a>(
  inner: Arc<Inner>,
  workflow_id: &'a str,
  input: serde_json::Value,
  options: ExecuteOptions,
) -> Pin<Box<dyn Future<Output = Result<ExecutionHandle, BackendError>> + Send + 'a>> {
  Box::pin(async move {
  let definition = {
    let workflows = inner.workflows.lock().unwrap_or_else(|e| e.into_inner());
    workflows
      .get(workflow_id)
      .cloned()
      .ok_or_else(|| BackendError::WorkflowNotFound(workflow_id.to_string()))?
  };

  let pipeline_input: PipelineInput = serde_json::from_value(input.clone())?;
  let execution_id = options
    .execution_id
    .clone()
    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

  inner
    .store
    .create_execution(&ExecutionRecord {
      execution_id: execution_id.clone(),
      workflow_id: definition.id.clone(),
      unit_id: pipeline_input.unit_id.clone(),
      status: ExecutionStatus::Running,
      input: Json(input),
      output: None,
      error: None,
      started_at: Utc::now(),
      completed_at: None,
    })
    .await?;

  let cancel = CancellationToken::new();
  let (signal_tx, signal_rx) = mpsc::unbounded_channel();
  {
    let mut running = inner.running.lock().unwrap_or_else(|e| e.into_inner());
    running.insert(
      execution_id.clone(),
      RunningExecution {
        cancel: cancel.clone(),
        signals: signal_tx,
      },
    );
  }

  notify(
    &inner,
    ExecutionUpdate {
      execution_id: execution_id.clone(),
      workflow_id: definition.id.clone(),
      unit_id: pipeline_input.unit_id.clone(),
      status: JobStatus::Running,
      error: None,
    },
  );

  let timeout = options
    .timeout
    .or_else(|| definition.timeout_seconds.map(Duration::from_secs));

  // Box the driver to break the type cycle: a driver may start children,
  // which spawn drivers of their own.
  let driver: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(drive_execution(
    inner.clone(),
    definition.id.clone(),
    execution_id.clone(),
    pipeline_input,
    timeout,
    cancel,
    signal_rx,
  ));
  tokio::spawn(driver);

  Ok(ExecutionHandle {
    execution_id,
    workflow_id: definition.id,
    status: JobStatus::Running,
  })
  })
}

#[instrument(
  name = "execution_drive",
  skip_all,
  fields(execution_id = %execution_id, workflow_id = %workflow_id)
)]
async fn drive_execution(
  inner: Arc<Inner>,
  workflow_id: String,
  execution_id: String,
  input: PipelineInput,
  timeout: Option<Duration>,
  cancel: CancellationToken,
  mut signals: mpsc::UnboundedReceiver<Signal>,
) {
  let (sink, progress) = ChannelSink::new();
  let persist = tokio::spawn(persist_progress(inner.store.clone(), progress));

  let outcome = {
    let pipeline = Pipeline::new(inner.steps.clone(), Arc::new(sink));
    let run = pipeline.run(&input, cancel.clone());
    tokio::pin!(run);
    // Effectively unbounded when no timeout is configured.
    let deadline = tokio::time::sleep(timeout.unwrap_or(Duration::from_secs(86_400 * 365)));
    tokio::pin!(deadline);

    loop {
      tokio::select! {
        result = &mut run => break Some(result),
        () = &mut deadline, if timeout.is_some() => {
          warn!(timeout = ?timeout, "execution timed out");
          cancel.cancel();
          break None;
        }
        Some(signal) = signals.recv() => {
          handle_signal(&inner, &execution_id, signal).await;
        }
      }
    }
  };
  // The pipeline and its sink are gone; drain the remaining events before
  // recording the final status.
  let _ = persist.await;

  let (status, output, error) = match outcome {
    Some(Ok(result)) => {
      let output = serde_json::json!({
        "quality_score": result.quality.score,
        "published": result.published,
        "outputs": result.outputs,
      });
      (ExecutionStatus::Succeeded, Some(output), None)
    }
    Some(Err(PipelineError::Cancelled)) => (ExecutionStatus::Cancelled, None, None),
    Some(Err(err)) => (ExecutionStatus::Failed, None, Some(err.to_string())),
    None => (
      ExecutionStatus::TimedOut,
      None,
      Some("execution exceeded its timeout".to_string()),
    ),
  };

  // cancel() and terminate() write their terminal status directly; never
  // overwrite one with the driver's view.
  let already_settled = match inner.store.get_execution(&execution_id).await {
    Ok(record) => record.status.is_terminal(),
    Err(err) => {
      error!(error = %err, "failed to read execution record");
      false
    }
  };
  if !already_settled {
    if let Err(err) = inner
      .store
      .update_execution(&execution_id, status, output, error.clone(), Some(Utc::now()))
      .await
    {
      error!(error = %err, "failed to persist final execution status");
    }
  }

  {
    let mut running = inner.running.lock().unwrap_or_else(|e| e.into_inner());
    running.remove(&execution_id);
  }

  let final_status = match inner.store.get_execution(&execution_id).await {
    Ok(record) => JobStatus::from(record.status),
    Err(_) => JobStatus::Unknown,
  };
  info!(status = ?final_status, "execution finished");
  notify(
    &inner,
    ExecutionUpdate {
      execution_id,
      workflow_id,
      unit_id: input.unit_id,
      status: final_status,
      error,
    },
  );
}

async fn handle_signal(inner: &Arc<Inner>, execution_id: &str, signal: Signal) {
  info!(
    execution_id = %execution_id,
    signal = %signal.name,
    "signal_received"
  );
  if signal.name == START_CHILD_WORKFLOW {
    let workflow_id = signal.payload["workflow_id"].as_str().unwrap_or_default().to_string();
    let input = signal.payload["input"].clone();
    match start_execution(inner.clone(), &workflow_id, input, ExecuteOptions::default()).await {
      Ok(handle) => info!(
        child_execution_id = %handle.execution_id,
        child_workflow_id = %workflow_id,
        "child workflow started"
      ),
      Err(err) => warn!(
        child_workflow_id = %workflow_id,
        error = %err,
        "failed to start child workflow"
      ),
    }
  }
}

/// Persist pipeline progress events as step records.
async fn persist_progress(
  store: Arc<dyn Store>,
  mut events: mpsc::UnboundedReceiver<ProgressEvent>,
) {
  let mut open: HashMap<String, StepRecord> = HashMap::new();

  while let Some(event) = events.recv().await {
    let result = match event {
      ProgressEvent::StepStarted {
        execution_id,
        step,
        percent,
        at,
        ..
      } => {
        let record = StepRecord {
          step_id: format!("{execution_id}:{}", step.name()),
          execution_id,
          step: step.name().to_string(),
          percent: percent as i32,
          status: StepStatus::Running,
          started_at: at,
          completed_at: None,
          error: None,
        };
        open.insert(record.step_id.clone(), record.clone());
        store.create_step(&record).await
      }
      ProgressEvent::StepCompleted {
        execution_id, step, at, ..
      } => {
        let step_id = format!("{execution_id}:{}", step.name());
        match open.remove(&step_id) {
          Some(mut record) => {
            record.status = StepStatus::Succeeded;
            record.completed_at = Some(at);
            store.update_step(&record).await
          }
          None => Ok(()),
        }
      }
      ProgressEvent::StepFailed {
        execution_id,
        step,
        error,
        at,
        ..
      } => {
        let step_id = format!("{execution_id}:{}", step.name());
        match open.remove(&step_id) {
          Some(mut record) => {
            record.status = StepStatus::Failed;
            record.completed_at = Some(at);
            record.error = Some(error);
            store.update_step(&record).await
          }
          None => Ok(()),
        }
      }
    };
    if let Err(err) = result {
      warn!(error = %err, "failed to persist step progress");
    }
  }
}

#[async_trait]
impl OrchestrationBackend for LocalBackend {
  async fn deploy(&self, definition: WorkflowDefinition) -> Result<String, BackendError> {
    let warnings = definition.validate()?;
    if !warnings.is_empty() {
      warn!(
        workflow_id = %definition.id,
        warnings = warnings.len(),
        "workflow deployed with validation warnings"
      );
    }
    let workflow_id = definition.id.clone();
    let mut workflows = self
      .inner
      .workflows
      .lock()
      .unwrap_or_else(|e| e.into_inner());
    workflows.insert(workflow_id.clone(), definition);
    info!(workflow_id = %workflow_id, "workflow_deployed");
    Ok(workflow_id)
  }

  async fn execute(
    &self,
    workflow_id: &str,
    input: serde_json::Value,
    options: ExecuteOptions,
  ) -> Result<ExecutionHandle, BackendError> {
    start_execution(self.inner.clone(), workflow_id, input, options).await
  }

  async fn get_status(&self, execution_id: &str) -> Result<JobStatus, BackendError> {
    match self.inner.store.get_execution(execution_id).await {
      Ok(record) => Ok(JobStatus::from(record.status)),
      Err(StoreError::NotFound(id)) => Err(BackendError::ExecutionNotFound(id)),
      Err(source) => Err(BackendError::Store(source)),
    }
  }

  async fn cancel(&self, execution_id: &str, reason: &str) -> Result<bool, BackendError> {
    let entry = {
      let running = self.inner.running.lock().unwrap_or_else(|e| e.into_inner());
      running.get(execution_id).map(|e| e.cancel.clone())
    };
    let Some(cancel) = entry else {
      return Ok(false);
    };

    self
      .inner
      .store
      .update_execution(
        execution_id,
        ExecutionStatus::Cancelled,
        None,
        Some(reason.to_string()),
        Some(Utc::now()),
      )
      .await?;
    cancel.cancel();
    info!(execution_id = %execution_id, reason = %reason, "execution_cancelled");
    Ok(true)
  }

  async fn terminate(
    &self,
    execution_id: &str,
    reason: &str,
    result: Option<serde_json::Value>,
  ) -> Result<bool, BackendError> {
    let entry = {
      let running = self.inner.running.lock().unwrap_or_else(|e| e.into_inner());
      running.get(execution_id).map(|e| e.cancel.clone())
    };
    let Some(cancel) = entry else {
      return Ok(false);
    };

    self
      .inner
      .store
      .update_execution(
        execution_id,
        ExecutionStatus::Terminated,
        result,
        Some(reason.to_string()),
        Some(Utc::now()),
      )
      .await?;
    cancel.cancel();
    info!(execution_id = %execution_id, reason = %reason, "execution_terminated");
    Ok(true)
  }

  async fn signal(
    &self,
    execution_id: &str,
    name: &str,
    payload: serde_json::Value,
  ) -> Result<bool, BackendError> {
    let sender = {
      let running = self.inner.running.lock().unwrap_or_else(|e| e.into_inner());
      running.get(execution_id).map(|e| e.signals.clone())
    };
    match sender {
      Some(sender) => Ok(
        sender
          .send(Signal {
            name: name.to_string(),
            payload,
          })
          .is_ok(),
      ),
      None => Ok(false),
    }
  }

  async fn execute_child_workflow(
    &self,
    parent_execution_id: &str,
    child: WorkflowDefinition,
    input: serde_json::Value,
  ) -> Result<ExecutionHandle, BackendError> {
    let child_workflow_id = self.deploy(child).await?;
    let handle = start_execution(
      self.inner.clone(),
      &child_workflow_id,
      input,
      ExecuteOptions::default(),
    )
    .await?;

    // Best effort: the parent may already be done, which is not an error.
    let delivered = self
      .signal(
        parent_execution_id,
        "child_workflow_started",
        serde_json::json!({
          "child_execution_id": handle.execution_id,
          "child_workflow_id": child_workflow_id,
        }),
      )
      .await?;
    if !delivered {
      warn!(
        parent_execution_id = %parent_execution_id,
        "parent not running, child started without notification"
      );
    }
    Ok(handle)
  }

  async fn reset_execution(
    &self,
    execution_id: &str,
    options: ResetOptions,
  ) -> Result<ExecutionHandle, BackendError> {
    let record = match self.inner.store.get_execution(execution_id).await {
      Ok(record) => record,
      Err(StoreError::NotFound(id)) => return Err(BackendError::ExecutionNotFound(id)),
      Err(source) => return Err(BackendError::Store(source)),
    };

    info!(
      execution_id = %execution_id,
      reason = options.reason.as_deref().unwrap_or("unspecified"),
      "execution_reset"
    );
    start_execution(
      self.inner.clone(),
      &record.workflow_id,
      record.input.0.clone(),
      ExecuteOptions::default(),
    )
    .await
  }

  async fn schedule(
    &self,
    workflow_id: &str,
    cron_expr: &str,
    input: serde_json::Value,
    options: ScheduleOptions,
  ) -> Result<String, BackendError> {
    {
      let workflows = self
        .inner
        .workflows
        .lock()
        .unwrap_or_else(|e| e.into_inner());
      if !workflows.contains_key(workflow_id) {
        return Err(BackendError::WorkflowNotFound(workflow_id.to_string()));
      }
    }

    let entry = ScheduleEntry::start(
      self.inner.clone(),
      workflow_id.to_string(),
      cron_expr,
      input,
      options,
    )?;
    let schedule_id = entry.schedule_id.clone();
    let mut schedules = self
      .inner
      .schedules
      .lock()
      .unwrap_or_else(|e| e.into_inner());
    schedules.insert(schedule_id.clone(), entry);
    Ok(schedule_id)
  }

  async fn pause_schedule(&self, schedule_id: &str) -> Result<(), BackendError> {
    let schedules = self
      .inner
      .schedules
      .lock()
      .unwrap_or_else(|e| e.into_inner());
    let entry = schedules
      .get(schedule_id)
      .ok_or_else(|| BackendError::ScheduleNotFound(schedule_id.to_string()))?;
    entry.paused.store(true, Ordering::SeqCst);
    info!(schedule_id = %schedule_id, "schedule_paused");
    Ok(())
  }

  async fn unpause_schedule(&self, schedule_id: &str) -> Result<(), BackendError> {
    let schedules = self
      .inner
      .schedules
      .lock()
      .unwrap_or_else(|e| e.into_inner());
    let entry = schedules
      .get(schedule_id)
      .ok_or_else(|| BackendError::ScheduleNotFound(schedule_id.to_string()))?;
    entry.paused.store(false, Ordering::SeqCst);
    info!(schedule_id = %schedule_id, "schedule_unpaused");
    Ok(())
  }

  async fn execute_batch(
    &self,
    operation: BatchOperation,
    execution_ids: &[String],
  ) -> Result<BatchOutcome, BackendError> {
    let mut outcome = BatchOutcome::default();

    for chunk in execution_ids.chunks(self.inner.config.batch_concurrency.max(1)) {
      let futures = chunk.iter().map(|id| {
        let operation = operation.clone();
        async move {
          let applied = match operation {
            BatchOperation::Cancel { reason } => self.cancel(id, &reason).await,
            BatchOperation::Terminate { reason } => self.terminate(id, &reason, None).await,
            BatchOperation::Signal { name, payload } => self.signal(id, &name, payload).await,
            BatchOperation::Reset { options } => {
              self.reset_execution(id, options).await.map(|_| true)
            }
          };
          (id.clone(), applied)
        }
      });

      for (id, applied) in futures::future::join_all(futures).await {
        match applied {
          Ok(true) => outcome.successful.push(id),
          Ok(false) => outcome.failed.push((id, "execution not running".to_string())),
          Err(err) => outcome.failed.push((id, err.to_string())),
        }
      }
    }

    info!(
      successful = outcome.successful.len(),
      failed = outcome.failed.len(),
      "batch_operation_finished"
    );
    Ok(outcome)
  }

  async fn check_health(&self) -> HealthStatus {
    match probe_store(self.inner.store.as_ref()).await {
      Ok(()) => HealthStatus {
        healthy: true,
        details: "store reachable".to_string(),
      },
      Err(err) => HealthStatus {
        healthy: false,
        details: err.to_string(),
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::definition::TaskDefinition;
  use tidewave_pipeline::SimulatedSteps;
  use tidewave_store::MemoryStore;

  fn definition(id: &str) -> WorkflowDefinition {
    WorkflowDefinition::new(
      id,
      vec![TaskDefinition {
        id: "pipeline".to_string(),
        depends_on: vec![],
        params: serde_json::Value::Null,
      }],
    )
  }

  async fn backend_with(steps: SimulatedSteps) -> LocalBackend {
    LocalBackend::connect(
      Arc::new(MemoryStore::new()),
      Arc::new(steps),
      LocalBackendConfig::default(),
    )
    .await
    .unwrap()
  }

  fn input(unit: &str) -> serde_json::Value {
    serde_json::json!({"unit_id": unit, "path": format!("src/m/{unit}.php")})
  }

  async fn await_terminal(
    updates: &mut mpsc::UnboundedReceiver<ExecutionUpdate>,
    execution_id: &str,
  ) -> ExecutionUpdate {
    loop {
      let update = updates.recv().await.expect("update channel closed");
      if update.execution_id == execution_id && update.status.is_terminal() {
        return update;
      }
    }
  }

  #[tokio::test]
  async fn execution_completes_and_persists() {
    let backend = backend_with(SimulatedSteps::default()).await;
    let mut updates = backend.subscribe();
    backend.deploy(definition("unit-migration")).await.unwrap();

    let handle = backend
      .execute("unit-migration", input("cart"), ExecuteOptions::default())
      .await
      .unwrap();
    assert_eq!(handle.status, JobStatus::Running);

    let update = await_terminal(&mut updates, &handle.execution_id).await;
    assert_eq!(update.status, JobStatus::Completed);
    assert_eq!(
      backend.get_status(&handle.execution_id).await.unwrap(),
      JobStatus::Completed
    );
  }

  #[tokio::test]
  async fn step_failure_surfaces_as_failed() {
    let backend =
      backend_with(SimulatedSteps::default().failing_validation_for(["cart"])).await;
    let mut updates = backend.subscribe();
    backend.deploy(definition("unit-migration")).await.unwrap();

    let handle = backend
      .execute("unit-migration", input("cart"), ExecuteOptions::default())
      .await
      .unwrap();
    let update = await_terminal(&mut updates, &handle.execution_id).await;
    assert_eq!(update.status, JobStatus::Failed);
    assert!(update.error.unwrap().contains("simulated fault"));
  }

  #[tokio::test]
  async fn cancel_stops_a_running_execution() {
    let backend =
      backend_with(SimulatedSteps::default().with_delay(Duration::from_millis(50))).await;
    let mut updates = backend.subscribe();
    backend.deploy(definition("unit-migration")).await.unwrap();

    let handle = backend
      .execute("unit-migration", input("cart"), ExecuteOptions::default())
      .await
      .unwrap();
    assert!(backend.cancel(&handle.execution_id, "operator request").await.unwrap());

    let update = await_terminal(&mut updates, &handle.execution_id).await;
    assert_eq!(update.status, JobStatus::Canceled);
    // A second cancel finds nothing running.
    assert!(!backend.cancel(&handle.execution_id, "again").await.unwrap());
  }

  #[tokio::test]
  async fn timeout_maps_to_timed_out() {
    let backend =
      backend_with(SimulatedSteps::default().with_delay(Duration::from_millis(100))).await;
    let mut updates = backend.subscribe();
    backend.deploy(definition("unit-migration")).await.unwrap();

    let handle = backend
      .execute(
        "unit-migration",
        input("cart"),
        ExecuteOptions {
          timeout: Some(Duration::from_millis(10)),
          ..ExecuteOptions::default()
        },
      )
      .await
      .unwrap();
    let update = await_terminal(&mut updates, &handle.execution_id).await;
    assert_eq!(update.status, JobStatus::TimedOut);
  }

  #[tokio::test]
  async fn signal_to_finished_execution_returns_false() {
    let backend = backend_with(SimulatedSteps::default()).await;
    let mut updates = backend.subscribe();
    backend.deploy(definition("unit-migration")).await.unwrap();

    let handle = backend
      .execute("unit-migration", input("cart"), ExecuteOptions::default())
      .await
      .unwrap();
    await_terminal(&mut updates, &handle.execution_id).await;

    let delivered = backend
      .signal(&handle.execution_id, "noop", serde_json::Value::Null)
      .await
      .unwrap();
    assert!(!delivered);
  }

  #[tokio::test]
  async fn child_workflow_runs_to_completion() {
    let backend = backend_with(SimulatedSteps::default()).await;
    let mut updates = backend.subscribe();
    backend.deploy(definition("parent")).await.unwrap();

    let parent = backend
      .execute("parent", input("cart"), ExecuteOptions::default())
      .await
      .unwrap();
    let child = backend
      .execute_child_workflow(&parent.execution_id, definition("child"), input("auth"))
      .await
      .unwrap();

    let update = await_terminal(&mut updates, &child.execution_id).await;
    assert_eq!(update.status, JobStatus::Completed);
    assert_eq!(update.unit_id, "auth");
  }

  #[tokio::test]
  async fn reset_produces_a_fresh_execution() {
    let backend = backend_with(SimulatedSteps::default()).await;
    let mut updates = backend.subscribe();
    backend.deploy(definition("unit-migration")).await.unwrap();

    let first = backend
      .execute("unit-migration", input("cart"), ExecuteOptions::default())
      .await
      .unwrap();
    await_terminal(&mut updates, &first.execution_id).await;

    let second = backend
      .reset_execution(&first.execution_id, ResetOptions::default())
      .await
      .unwrap();
    assert_ne!(second.execution_id, first.execution_id);
    let update = await_terminal(&mut updates, &second.execution_id).await;
    assert_eq!(update.status, JobStatus::Completed);
  }

  #[tokio::test]
  async fn batch_outcome_has_one_entry_per_id() {
    let backend =
      backend_with(SimulatedSteps::default().with_delay(Duration::from_millis(100))).await;
    backend.deploy(definition("unit-migration")).await.unwrap();

    let running = backend
      .execute("unit-migration", input("cart"), ExecuteOptions::default())
      .await
      .unwrap();
    let ids = vec![running.execution_id.clone(), "missing".to_string()];

    let outcome = backend
      .execute_batch(
        BatchOperation::Cancel {
          reason: "sweep".to_string(),
        },
        &ids,
      )
      .await
      .unwrap();
    assert_eq!(outcome.successful.len() + outcome.failed.len(), ids.len());
    assert_eq!(outcome.successful, [running.execution_id.clone()]);
    assert_eq!(outcome.failed[0].0, "missing");

    // Reset re-runs the now-settled execution; the unknown id still fails.
    let outcome = backend
      .execute_batch(
        BatchOperation::Reset {
          options: ResetOptions {
            reason: Some("sweep".to_string()),
          },
        },
        &ids,
      )
      .await
      .unwrap();
    assert_eq!(outcome.successful.len() + outcome.failed.len(), ids.len());
    assert_eq!(outcome.successful, [running.execution_id]);
    assert_eq!(outcome.failed[0].0, "missing");
  }

  #[tokio::test]
  async fn caller_assigned_execution_id_is_used() {
    let backend = backend_with(SimulatedSteps::default()).await;
    let mut updates = backend.subscribe();
    backend.deploy(definition("unit-migration")).await.unwrap();

    let handle = backend
      .execute(
        "unit-migration",
        input("cart"),
        ExecuteOptions {
          execution_id: Some("exec-cart-1".to_string()),
          ..ExecuteOptions::default()
        },
      )
      .await
      .unwrap();
    assert_eq!(handle.execution_id, "exec-cart-1");

    let update = await_terminal(&mut updates, "exec-cart-1").await;
    assert_eq!(update.status, JobStatus::Completed);
  }

  #[tokio::test]
  async fn list_schedules_reports_registered_entries() {
    let backend = backend_with(SimulatedSteps::default()).await;
    backend.deploy(definition("unit-migration")).await.unwrap();

    let schedule_id = backend
      .schedule(
        "unit-migration",
        "0 0 3 * * * *",
        input("cart"),
        ScheduleOptions {
          note: Some("nightly sweep".to_string()),
          ..ScheduleOptions::default()
        },
      )
      .await
      .unwrap();

    let schedules = backend.list_schedules();
    assert_eq!(schedules.len(), 1);
    assert_eq!(schedules[0].schedule_id, schedule_id);
    assert_eq!(schedules[0].workflow_id, "unit-migration");
    assert_eq!(schedules[0].cron_expr, "0 0 3 * * * *");
    assert_eq!(schedules[0].note.as_deref(), Some("nightly sweep"));
    assert!(!schedules[0].paused);

    backend.pause_schedule(&schedule_id).await.unwrap();
    assert!(backend.list_schedules()[0].paused);
  }

  #[tokio::test]
  async fn invalid_cron_is_rejected() {
    let backend = backend_with(SimulatedSteps::default()).await;
    backend.deploy(definition("unit-migration")).await.unwrap();

    let err = backend
      .schedule(
        "unit-migration",
        "not a cron",
        input("cart"),
        ScheduleOptions::default(),
      )
      .await
      .unwrap_err();
    assert!(matches!(err, BackendError::InvalidCron { .. }));
  }

  #[tokio::test]
  async fn pause_of_unknown_schedule_errors() {
    let backend = backend_with(SimulatedSteps::default()).await;
    let err = backend.pause_schedule("missing").await.unwrap_err();
    assert!(matches!(err, BackendError::ScheduleNotFound(_)));
  }

  #[tokio::test]
  async fn health_check_reports_store_reachable() {
    let backend = backend_with(SimulatedSteps::default()).await;
    let health = backend.check_health().await;
    assert!(health.healthy);
  }
}
