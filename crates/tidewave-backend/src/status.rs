use serde::{Deserialize, Serialize};
use tidewave_store::ExecutionStatus;

/// Backend-independent view of an execution's state.
///
/// Backend-native states map onto this enum; anything unrecognized maps to
/// [`JobStatus::Unknown`], never to `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
  Completed,
  Failed,
  Canceled,
  Terminated,
  Running,
  TimedOut,
  Unknown,
}

impl JobStatus {
  /// Map a backend-native state name onto the shared enum.
  pub fn from_native(state: &str) -> Self {
    match state.to_ascii_lowercase().as_str() {
      "completed" | "succeeded" => JobStatus::Completed,
      "failed" => JobStatus::Failed,
      "canceled" | "cancelled" => JobStatus::Canceled,
      "terminated" => JobStatus::Terminated,
      "running" | "paused" => JobStatus::Running,
      "timed_out" | "timedout" => JobStatus::TimedOut,
      _ => JobStatus::Unknown,
    }
  }

  pub fn is_terminal(self) -> bool {
    !matches!(self, JobStatus::Running | JobStatus::Unknown)
  }
}

impl From<ExecutionStatus> for JobStatus {
  fn from(status: ExecutionStatus) -> Self {
    match status {
      ExecutionStatus::Running | ExecutionStatus::Paused => JobStatus::Running,
      ExecutionStatus::Succeeded => JobStatus::Completed,
      ExecutionStatus::Failed => JobStatus::Failed,
      ExecutionStatus::Cancelled => JobStatus::Canceled,
      ExecutionStatus::Terminated => JobStatus::Terminated,
      ExecutionStatus::TimedOut => JobStatus::TimedOut,
    }
  }
}

/// Result of a backend health probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
  pub healthy: bool,
  pub details: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unrecognized_states_map_to_unknown() {
    assert_eq!(JobStatus::from_native("exotic_state"), JobStatus::Unknown);
    assert_eq!(JobStatus::from_native(""), JobStatus::Unknown);
    // Unknown must never read as success.
    assert_ne!(JobStatus::from_native("exotic_state"), JobStatus::Completed);
  }

  #[test]
  fn native_spellings_are_accepted() {
    assert_eq!(JobStatus::from_native("SUCCEEDED"), JobStatus::Completed);
    assert_eq!(JobStatus::from_native("cancelled"), JobStatus::Canceled);
    assert_eq!(JobStatus::from_native("timedout"), JobStatus::TimedOut);
  }

  #[test]
  fn store_statuses_round_trip() {
    assert_eq!(JobStatus::from(ExecutionStatus::Paused), JobStatus::Running);
    assert_eq!(
      JobStatus::from(ExecutionStatus::Terminated),
      JobStatus::Terminated
    );
  }
}
