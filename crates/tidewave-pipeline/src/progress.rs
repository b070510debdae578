//! Progress events and sinks for observability.
//!
//! The pipeline emits one event before each step runs and one after it
//! finishes, so a consumer always sees the milestone a crashed execution
//! had reached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::step::MigrationStep;

/// Progress events emitted during a pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProgressEvent {
  /// A step is about to run. Persisted before the step body starts.
  StepStarted {
    execution_id: String,
    unit_id: String,
    step: MigrationStep,
    percent: u8,
    at: DateTime<Utc>,
  },

  /// A step finished successfully.
  StepCompleted {
    execution_id: String,
    unit_id: String,
    step: MigrationStep,
    output: serde_json::Value,
    at: DateTime<Utc>,
  },

  /// A step failed. The pipeline transitions to its terminal error state.
  StepFailed {
    execution_id: String,
    unit_id: String,
    step: MigrationStep,
    error: String,
    at: DateTime<Utc>,
  },
}

impl ProgressEvent {
  pub fn execution_id(&self) -> &str {
    match self {
      ProgressEvent::StepStarted { execution_id, .. }
      | ProgressEvent::StepCompleted { execution_id, .. }
      | ProgressEvent::StepFailed { execution_id, .. } => execution_id,
    }
  }
}

/// Trait for receiving pipeline progress events.
///
/// The pipeline calls `record` for each event - implementations decide what
/// to do with them (persist, broadcast, log, ignore, etc.).
pub trait ProgressSink: Send + Sync {
  fn record(&self, event: ProgressEvent);
}

/// A no-op sink that discards all events.
///
/// Useful for tests or when progress observation is not needed.
#[derive(Debug, Clone, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
  fn record(&self, _event: ProgressEvent) {
    // Intentionally empty
  }
}

/// A sink that sends events to an unbounded channel.
///
/// Use this when progress must be consumed asynchronously, e.g. persisted
/// to the store or streamed to a status view. The channel is unbounded so a
/// slow consumer never stalls the pipeline; volume is a handful of events
/// per execution.
#[derive(Debug, Clone)]
pub struct ChannelSink {
  sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
  /// Create a sink and the receiver to drain it.
  pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self { sender }, receiver)
  }
}

impl ProgressSink for ChannelSink {
  fn record(&self, event: ProgressEvent) {
    // A closed receiver means nobody is listening anymore; dropping the
    // event is the correct behavior.
    let _ = self.sender.send(event);
  }
}
