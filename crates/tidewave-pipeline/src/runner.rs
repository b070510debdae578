//! The per-unit pipeline driver.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::error::{PipelineError, StepError};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::step::{MigrationStep, PipelineInput, QualityReport};

/// The seam to the external analyzers, generators, and publishers.
///
/// Each method corresponds to one pipeline step and receives the output of
/// the previous step where one exists.
#[async_trait]
pub trait StepRunner: Send + Sync {
  async fn analyze(&self, input: &PipelineInput) -> Result<serde_json::Value, StepError>;

  async fn generate(
    &self,
    input: &PipelineInput,
    analysis: &serde_json::Value,
  ) -> Result<serde_json::Value, StepError>;

  async fn validate(
    &self,
    input: &PipelineInput,
    generated: &serde_json::Value,
  ) -> Result<serde_json::Value, StepError>;

  async fn quality_check(
    &self,
    input: &PipelineInput,
    generated: &serde_json::Value,
  ) -> Result<QualityReport, StepError>;

  async fn publish(
    &self,
    input: &PipelineInput,
    generated: &serde_json::Value,
  ) -> Result<serde_json::Value, StepError>;
}

#[async_trait]
impl<T: StepRunner + ?Sized> StepRunner for Arc<T> {
  async fn analyze(&self, input: &PipelineInput) -> Result<serde_json::Value, StepError> {
    (**self).analyze(input).await
  }

  async fn generate(
    &self,
    input: &PipelineInput,
    analysis: &serde_json::Value,
  ) -> Result<serde_json::Value, StepError> {
    (**self).generate(input, analysis).await
  }

  async fn validate(
    &self,
    input: &PipelineInput,
    generated: &serde_json::Value,
  ) -> Result<serde_json::Value, StepError> {
    (**self).validate(input, generated).await
  }

  async fn quality_check(
    &self,
    input: &PipelineInput,
    generated: &serde_json::Value,
  ) -> Result<QualityReport, StepError> {
    (**self).quality_check(input, generated).await
  }

  async fn publish(
    &self,
    input: &PipelineInput,
    generated: &serde_json::Value,
  ) -> Result<serde_json::Value, StepError> {
    (**self).publish(input, generated).await
  }
}

/// Outcome of a completed pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
  pub execution_id: String,
  pub unit_id: String,
  pub quality: QualityReport,
  /// True when publish ran and succeeded.
  pub published: bool,
  /// Step outputs keyed by step name.
  pub outputs: serde_json::Value,
  pub completed_at: chrono::DateTime<chrono::Utc>,
}

/// Drives one unit through the migration state machine.
pub struct Pipeline<R> {
  runner: R,
  sink: Arc<dyn ProgressSink>,
}

impl<R: StepRunner> Pipeline<R> {
  pub fn new(runner: R, sink: Arc<dyn ProgressSink>) -> Self {
    Self { runner, sink }
  }

  /// Run the full state machine for one unit.
  ///
  /// Progress is recorded before every step body, so an interrupted
  /// execution is observable at the milestone it reached. The first step
  /// failure moves the execution to its terminal error state with the
  /// runner's message preserved.
  #[instrument(
    name = "pipeline_execute",
    skip(self, input, cancel),
    fields(unit_id = %input.unit_id)
  )]
  pub async fn run(
    &self,
    input: &PipelineInput,
    cancel: CancellationToken,
  ) -> Result<PipelineResult, PipelineError> {
    let execution_id = uuid::Uuid::new_v4().to_string();

    info!(
      execution_id = %execution_id,
      unit_id = %input.unit_id,
      path = %input.path,
      "pipeline_started"
    );

    self.enter(&execution_id, input, MigrationStep::Init, &cancel)?;
    self.complete(&execution_id, input, MigrationStep::Init, serde_json::json!({}));

    self.enter(&execution_id, input, MigrationStep::Analyze, &cancel)?;
    let analysis = self
      .settle(
        &execution_id,
        input,
        MigrationStep::Analyze,
        self.runner.analyze(input).await,
      )?;

    self.enter(&execution_id, input, MigrationStep::Generate, &cancel)?;
    let generated = self
      .settle(
        &execution_id,
        input,
        MigrationStep::Generate,
        self.runner.generate(input, &analysis).await,
      )?;

    self.enter(&execution_id, input, MigrationStep::Validate, &cancel)?;
    let validation = self
      .settle(
        &execution_id,
        input,
        MigrationStep::Validate,
        self.runner.validate(input, &generated).await,
      )?;

    self.enter(&execution_id, input, MigrationStep::QualityCheck, &cancel)?;
    let quality = match self.runner.quality_check(input, &generated).await {
      Ok(report) => {
        self.complete(
          &execution_id,
          input,
          MigrationStep::QualityCheck,
          serde_json::json!({"score": report.score, "issues": report.issues}),
        );
        report
      }
      Err(source) => {
        return Err(self.fail(&execution_id, input, MigrationStep::QualityCheck, source));
      }
    };

    let mut published = false;
    let mut publish_output = serde_json::Value::Null;
    if input.publish {
      if quality.score >= input.quality_threshold {
        self.enter(&execution_id, input, MigrationStep::Publish, &cancel)?;
        publish_output = self
          .settle(
            &execution_id,
            input,
            MigrationStep::Publish,
            self.runner.publish(input, &generated).await,
          )?;
        published = true;
      } else {
        warn!(
          execution_id = %execution_id,
          unit_id = %input.unit_id,
          score = quality.score,
          threshold = input.quality_threshold,
          "publish skipped, quality below threshold"
        );
      }
    }

    self.enter(&execution_id, input, MigrationStep::Complete, &cancel)?;
    self.complete(
      &execution_id,
      input,
      MigrationStep::Complete,
      serde_json::json!({"published": published}),
    );

    info!(
      execution_id = %execution_id,
      unit_id = %input.unit_id,
      quality_score = quality.score,
      published,
      "pipeline_completed"
    );

    Ok(PipelineResult {
      execution_id: execution_id.clone(),
      unit_id: input.unit_id.clone(),
      quality,
      published,
      outputs: serde_json::json!({
        "analyze": analysis,
        "generate": generated,
        "validate": validation,
        "publish": publish_output,
      }),
      completed_at: Utc::now(),
    })
  }

  /// Record the milestone before the step body runs.
  fn enter(
    &self,
    execution_id: &str,
    input: &PipelineInput,
    step: MigrationStep,
    cancel: &CancellationToken,
  ) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
      warn!(execution_id = %execution_id, unit_id = %input.unit_id, "pipeline cancelled");
      return Err(PipelineError::Cancelled);
    }
    self.sink.record(ProgressEvent::StepStarted {
      execution_id: execution_id.to_string(),
      unit_id: input.unit_id.clone(),
      step,
      percent: step.milestone(),
      at: Utc::now(),
    });
    Ok(())
  }

  fn settle(
    &self,
    execution_id: &str,
    input: &PipelineInput,
    step: MigrationStep,
    result: Result<serde_json::Value, StepError>,
  ) -> Result<serde_json::Value, PipelineError> {
    match result {
      Ok(output) => {
        self.complete(execution_id, input, step, output.clone());
        Ok(output)
      }
      Err(source) => Err(self.fail(execution_id, input, step, source)),
    }
  }

  fn complete(
    &self,
    execution_id: &str,
    input: &PipelineInput,
    step: MigrationStep,
    output: serde_json::Value,
  ) {
    info!(
      execution_id = %execution_id,
      unit_id = %input.unit_id,
      step = %step,
      "step_completed"
    );
    self.sink.record(ProgressEvent::StepCompleted {
      execution_id: execution_id.to_string(),
      unit_id: input.unit_id.clone(),
      step,
      output,
      at: Utc::now(),
    });
  }

  fn fail(
    &self,
    execution_id: &str,
    input: &PipelineInput,
    step: MigrationStep,
    source: StepError,
  ) -> PipelineError {
    error!(
      execution_id = %execution_id,
      unit_id = %input.unit_id,
      step = %step,
      error = %source,
      "step_failed"
    );
    self.sink.record(ProgressEvent::StepFailed {
      execution_id: execution_id.to_string(),
      unit_id: input.unit_id.clone(),
      step,
      error: source.to_string(),
      at: Utc::now(),
    });
    PipelineError::Step { step, source }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::progress::ChannelSink;
  use crate::sim::SimulatedSteps;

  fn pipeline_with_channel() -> (
    Pipeline<SimulatedSteps>,
    tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>,
  ) {
    let (sink, receiver) = ChannelSink::new();
    (Pipeline::new(SimulatedSteps::default(), Arc::new(sink)), receiver)
  }

  fn drain(
    receiver: &mut tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>,
  ) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
      events.push(event);
    }
    events
  }

  #[tokio::test]
  async fn happy_path_walks_every_milestone() {
    let (pipeline, mut receiver) = pipeline_with_channel();
    let input = PipelineInput::new("cart", "src/cart/panier.php");

    let result = pipeline.run(&input, CancellationToken::new()).await.unwrap();
    assert_eq!(result.unit_id, "cart");
    assert!(!result.published);

    let milestones: Vec<u8> = drain(&mut receiver)
      .into_iter()
      .filter_map(|e| match e {
        ProgressEvent::StepStarted { percent, .. } => Some(percent),
        _ => None,
      })
      .collect();
    // Publish is skipped when not requested.
    assert_eq!(milestones, [10, 30, 50, 70, 90, 100]);
  }

  #[tokio::test]
  async fn publish_runs_when_quality_clears_threshold() {
    let (pipeline, _receiver) = pipeline_with_channel();
    let mut input = PipelineInput::new("cart", "src/cart/panier.php");
    input.publish = true;
    input.quality_threshold = 0.0;

    let result = pipeline.run(&input, CancellationToken::new()).await.unwrap();
    assert!(result.published);
  }

  #[tokio::test]
  async fn publish_is_skipped_below_threshold() {
    let (pipeline, _receiver) = pipeline_with_channel();
    let mut input = PipelineInput::new("cart", "src/cart/panier.php");
    input.publish = true;
    input.quality_threshold = 1.1;

    let result = pipeline.run(&input, CancellationToken::new()).await.unwrap();
    assert!(!result.published);
  }

  #[tokio::test]
  async fn step_failure_is_terminal_and_preserves_the_message() {
    let (sink, mut receiver) = ChannelSink::new();
    let runner = SimulatedSteps::default().failing_validation_for(["cart"]);
    let pipeline = Pipeline::new(runner, Arc::new(sink));
    let input = PipelineInput::new("cart", "src/cart/panier.php");

    let err = pipeline
      .run(&input, CancellationToken::new())
      .await
      .unwrap_err();
    match err {
      PipelineError::Step { step, source } => {
        assert_eq!(step, MigrationStep::Validate);
        assert!(source.to_string().contains("cart"));
      }
      other => panic!("unexpected error: {other}"),
    }

    let events = drain(&mut receiver);
    assert!(
      events
        .iter()
        .any(|e| matches!(e, ProgressEvent::StepFailed { step, .. } if *step == MigrationStep::Validate))
    );
    // Nothing after the failure.
    assert!(
      !events
        .iter()
        .any(|e| matches!(e, ProgressEvent::StepStarted { step, .. } if *step == MigrationStep::QualityCheck))
    );
  }

  #[tokio::test]
  async fn cancellation_stops_between_steps() {
    let (pipeline, _receiver) = pipeline_with_channel();
    let input = PipelineInput::new("cart", "src/cart/panier.php");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = pipeline.run(&input, cancel).await.unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
  }
}
