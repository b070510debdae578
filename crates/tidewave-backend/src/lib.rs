//! Tidewave Backend
//!
//! This crate defines the [`OrchestrationBackend`] trait, the single seam
//! between the dispatcher and whatever runs migration workflows, plus the
//! bundled in-process implementation, [`LocalBackend`].
//!
//! The trait covers the full workflow lifecycle: deploy (with pre-deploy
//! validation), execute, status, cancel/terminate, signals, child
//! workflows, resets, cron schedules, bounded batch operations, and health
//! probes. Implementations are selected once at startup by [`BackendKind`];
//! call sites only ever hold `Arc<dyn OrchestrationBackend>`.

mod backend;
mod definition;
mod error;
mod local;
mod schedule;
mod status;

pub use backend::{
  BackendKind, BatchOperation, BatchOutcome, ExecuteOptions, ExecutionHandle,
  OrchestrationBackend, OverlapPolicy, ResetOptions, ScheduleOptions,
};
pub use definition::{TaskDefinition, WorkflowDefinition};
pub use error::BackendError;
pub use local::{
  ExecutionUpdate, LocalBackend, LocalBackendConfig, START_CHILD_WORKFLOW, Signal,
};
pub use schedule::ScheduleInfo;
pub use status::{HealthStatus, JobStatus};
