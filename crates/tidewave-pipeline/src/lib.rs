//! Tidewave Pipeline
//!
//! This crate provides the per-unit migration state machine:
//!
//! ```text
//! Init ─► Analyze ─► Generate ─► Validate ─► QualityCheck ─► [Publish] ─► Complete
//!   │        │           │           │             │              │
//!   └────────┴───────────┴───────────┴─────────────┴──────────────┴──► Error
//! ```
//!
//! The [`Pipeline`] drives a unit through the steps, recording a progress
//! milestone through a [`ProgressSink`] before each step body runs. Step
//! work is delegated to a [`StepRunner`]; the bundled [`SimulatedSteps`]
//! implementation fabricates deterministic outputs for dry runs.
//!
//! Error is terminal: a failed execution is never resumed, a retry is a
//! fresh execution submitted upstream.

mod error;
mod progress;
mod runner;
mod sim;
mod step;

pub use error::{PipelineError, StepError};
pub use progress::{ChannelSink, NoopSink, ProgressEvent, ProgressSink};
pub use runner::{Pipeline, PipelineResult, StepRunner};
pub use sim::SimulatedSteps;
pub use step::{MigrationStep, PipelineInput, QualityReport};
