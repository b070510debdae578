//! The orchestration backend trait and its operation types.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::definition::WorkflowDefinition;
use crate::error::BackendError;
use crate::status::{HealthStatus, JobStatus};

/// Which backend implementation to construct at startup.
///
/// Call sites never branch on this; it only selects the concrete type
/// behind the trait object during initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
  #[default]
  Local,
}

/// Options for starting an execution.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
  /// Wall-clock ceiling; overrides the definition's timeout when set.
  pub timeout: Option<Duration>,
  /// Caller-assigned execution id. A fresh UUID is minted when unset.
  pub execution_id: Option<String>,
}

/// Handle returned when an execution is started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionHandle {
  pub execution_id: String,
  pub workflow_id: String,
  pub status: JobStatus,
}

/// Options for resetting an execution.
#[derive(Debug, Clone, Default)]
pub struct ResetOptions {
  pub reason: Option<String>,
}

/// Operation applied to every id in a batch call.
#[derive(Debug, Clone)]
pub enum BatchOperation {
  Cancel { reason: String },
  Terminate { reason: String },
  Signal { name: String, payload: serde_json::Value },
  Reset { options: ResetOptions },
}

/// Outcome of a batch call: exactly one entry per input id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
  pub successful: Vec<String>,
  pub failed: Vec<(String, String)>,
}

/// How a schedule behaves when the previous run is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
  /// Start the new run regardless.
  Allow,
  /// Skip the tick and wait for the next one.
  #[default]
  Skip,
}

/// Options for registering a schedule.
#[derive(Debug, Clone, Default)]
pub struct ScheduleOptions {
  pub overlap: OverlapPolicy,
  pub note: Option<String>,
}

/// A workflow orchestration backend.
///
/// One implementation is selected by [`BackendKind`] at startup and used
/// through `Arc<dyn OrchestrationBackend>` everywhere else.
#[async_trait]
pub trait OrchestrationBackend: Send + Sync {
  /// Validate and register a workflow definition. Returns the workflow id.
  async fn deploy(&self, definition: WorkflowDefinition) -> Result<String, BackendError>;

  /// Start an execution of a deployed workflow. Non-blocking: the returned
  /// handle reports `Running`; poll [`get_status`](Self::get_status) or
  /// subscribe to updates for the outcome.
  async fn execute(
    &self,
    workflow_id: &str,
    input: serde_json::Value,
    options: ExecuteOptions,
  ) -> Result<ExecutionHandle, BackendError>;

  /// Current status of an execution, readable across restarts.
  async fn get_status(&self, execution_id: &str) -> Result<JobStatus, BackendError>;

  /// Request cooperative cancellation. Returns false when the execution is
  /// not running.
  async fn cancel(&self, execution_id: &str, reason: &str) -> Result<bool, BackendError>;

  /// Hard-stop an execution and record the provided result. Returns false
  /// when the execution is not running.
  async fn terminate(
    &self,
    execution_id: &str,
    reason: &str,
    result: Option<serde_json::Value>,
  ) -> Result<bool, BackendError>;

  /// Deliver a named signal to a running execution. Returns false when the
  /// execution is not running.
  async fn signal(
    &self,
    execution_id: &str,
    name: &str,
    payload: serde_json::Value,
  ) -> Result<bool, BackendError>;

  /// Deploy and start a child workflow on behalf of a running parent. The
  /// parent is signalled so its history records the hand-off.
  async fn execute_child_workflow(
    &self,
    parent_execution_id: &str,
    child: WorkflowDefinition,
    input: serde_json::Value,
  ) -> Result<ExecutionHandle, BackendError>;

  /// Re-run a finished execution from scratch with its original input.
  /// Returns the handle of the fresh execution.
  async fn reset_execution(
    &self,
    execution_id: &str,
    options: ResetOptions,
  ) -> Result<ExecutionHandle, BackendError>;

  /// Register a cron schedule for a deployed workflow.
  async fn schedule(
    &self,
    workflow_id: &str,
    cron_expr: &str,
    input: serde_json::Value,
    options: ScheduleOptions,
  ) -> Result<String, BackendError>;

  /// Pause a schedule. Ticks are skipped until unpaused.
  async fn pause_schedule(&self, schedule_id: &str) -> Result<(), BackendError>;

  /// Resume a paused schedule.
  async fn unpause_schedule(&self, schedule_id: &str) -> Result<(), BackendError>;

  /// Apply one operation to many executions with bounded fan-out. One
  /// failure never aborts the rest.
  async fn execute_batch(
    &self,
    operation: BatchOperation,
    execution_ids: &[String],
  ) -> Result<BatchOutcome, BackendError>;

  /// Probe backend connectivity.
  async fn check_health(&self) -> HealthStatus;
}
