//! Cron schedules driving recurring executions.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use cron::Schedule;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::{ExecuteOptions, OverlapPolicy, ScheduleOptions};
use crate::error::BackendError;
use crate::status::JobStatus;

/// A registered schedule and its driver task.
///
/// The driver loop sleeps until the next cron occurrence, skips ticks while
/// paused, and honors the overlap policy against the previous run.
pub(crate) struct ScheduleEntry {
  pub schedule_id: String,
  pub workflow_id: String,
  pub cron_expr: String,
  pub paused: Arc<AtomicBool>,
  pub note: Option<String>,
  cancel: CancellationToken,
}

/// Snapshot of a registered schedule, as reported by
/// [`LocalBackend::list_schedules`](crate::LocalBackend::list_schedules).
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleInfo {
  pub schedule_id: String,
  pub workflow_id: String,
  pub cron_expr: String,
  pub paused: bool,
  pub note: Option<String>,
}

impl ScheduleEntry {
  pub(crate) fn info(&self) -> ScheduleInfo {
    ScheduleInfo {
      schedule_id: self.schedule_id.clone(),
      workflow_id: self.workflow_id.clone(),
      cron_expr: self.cron_expr.clone(),
      paused: self.paused.load(Ordering::SeqCst),
      note: self.note.clone(),
    }
  }
}

impl ScheduleEntry {
  pub(crate) fn start(
    inner: Arc<crate::local::Inner>,
    workflow_id: String,
    cron_expr: &str,
    input: serde_json::Value,
    options: ScheduleOptions,
  ) -> Result<Self, BackendError> {
    let schedule = Schedule::from_str(cron_expr).map_err(|source| BackendError::InvalidCron {
      expr: cron_expr.to_string(),
      source,
    })?;

    let schedule_id = format!("schedule-{}", uuid::Uuid::new_v4());
    let paused = Arc::new(AtomicBool::new(false));
    let cancel = CancellationToken::new();

    info!(
      schedule_id = %schedule_id,
      workflow_id = %workflow_id,
      cron = %cron_expr,
      "schedule_registered"
    );

    tokio::spawn(drive_schedule(
      inner,
      schedule_id.clone(),
      workflow_id.clone(),
      schedule,
      input,
      options.overlap,
      paused.clone(),
      cancel.clone(),
    ));

    Ok(Self {
      schedule_id,
      workflow_id,
      cron_expr: cron_expr.to_string(),
      paused,
      note: options.note,
      cancel,
    })
  }
}

impl Drop for ScheduleEntry {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

#[allow(clippy::too_many_arguments)]
async fn drive_schedule(
  inner: Arc<crate::local::Inner>,
  schedule_id: String,
  workflow_id: String,
  schedule: Schedule,
  input: serde_json::Value,
  overlap: OverlapPolicy,
  paused: Arc<AtomicBool>,
  cancel: CancellationToken,
) {
  let mut previous: Option<String> = None;

  loop {
    let Some(next) = schedule.upcoming(Utc).next() else {
      warn!(schedule_id = %schedule_id, "schedule has no upcoming occurrences");
      return;
    };
    let wait = (next - Utc::now())
      .to_std()
      .unwrap_or(std::time::Duration::ZERO);

    tokio::select! {
      () = cancel.cancelled() => return,
      () = tokio::time::sleep(wait) => {}
    }

    if paused.load(Ordering::SeqCst) {
      continue;
    }

    if overlap == OverlapPolicy::Skip
      && let Some(previous_id) = &previous
      && crate::local::execution_status(&inner, previous_id).await == Some(JobStatus::Running)
    {
      info!(
        schedule_id = %schedule_id,
        previous_execution_id = %previous_id,
        "tick skipped, previous run still in flight"
      );
      continue;
    }

    match crate::local::start_execution(
      inner.clone(),
      &workflow_id,
      input.clone(),
      ExecuteOptions::default(),
    )
    .await
    {
      Ok(handle) => {
        info!(
          schedule_id = %schedule_id,
          execution_id = %handle.execution_id,
          "schedule_tick"
        );
        previous = Some(handle.execution_id);
      }
      Err(err) => {
        warn!(schedule_id = %schedule_id, error = %err, "schedule tick failed to start");
      }
    }
  }
}
