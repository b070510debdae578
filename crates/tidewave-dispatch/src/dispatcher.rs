//! The readiness-gated dispatcher.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tidewave_inventory::{MigrationUnit, UnitStatus};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::error::DispatchError;
use crate::queue::{QueueMessage, WorkQueue};

/// Terminal outcome reported for a dispatched unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
  Completed,
  Failed,
  Cancelled,
  TimedOut,
}

/// Event pushed onto the dispatcher when a unit's execution settles.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionEvent {
  pub unit_id: String,
  pub status: CompletionStatus,
  pub error: Option<String>,
}

/// Where dispatched units go.
pub enum DispatchMode {
  /// Enqueue a durable message for the worker fleet.
  Live {
    queue: Arc<dyn WorkQueue>,
    /// Enqueue retries before the unit is reported failed.
    max_attempts: u32,
  },
  /// Write a deterministic artifact and fire a synthetic completion.
  Simulated { dir: PathBuf, delay: Duration },
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
  pub max_concurrent: usize,
}

impl Default for DispatcherConfig {
  fn default() -> Self {
    Self { max_concurrent: 5 }
  }
}

/// Hands ready units to the dispatch target, bounded by `max_concurrent`.
///
/// A unit is ready when it is not completed, not in flight, and every
/// dependency within the inventory is completed. All bookkeeping lives on
/// the instance; two dispatchers never share state.
pub struct Dispatcher {
  units: HashMap<String, MigrationUnit>,
  /// Unit ids in dispatch order: composite score descending, id tie-break.
  order: Vec<String>,
  in_flight: HashSet<String>,
  failed: HashMap<String, String>,
  max_concurrent: usize,
  mode: DispatchMode,
  events_tx: mpsc::UnboundedSender<CompletionEvent>,
  events_rx: mpsc::UnboundedReceiver<CompletionEvent>,
}

impl Dispatcher {
  pub fn new(units: Vec<MigrationUnit>, mode: DispatchMode, config: DispatcherConfig) -> Self {
    let mut order: Vec<(String, f64)> = units.iter().map(|u| (u.id.clone(), u.score)).collect();
    order.sort_by(|a, b| {
      b.1
        .partial_cmp(&a.1)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| a.0.cmp(&b.0))
    });

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    Self {
      units: units.into_iter().map(|u| (u.id.clone(), u)).collect(),
      order: order.into_iter().map(|(id, _)| id).collect(),
      in_flight: HashSet::new(),
      failed: HashMap::new(),
      max_concurrent: config.max_concurrent.max(1),
      mode,
      events_tx,
      events_rx,
    }
  }

  /// Sender for completion events, for the worker bridging executions back
  /// to the dispatcher.
  pub fn event_sender(&self) -> mpsc::UnboundedSender<CompletionEvent> {
    self.events_tx.clone()
  }

  pub fn in_flight(&self) -> usize {
    self.in_flight.len()
  }

  pub fn unit_status(&self, unit_id: &str) -> Option<UnitStatus> {
    self.units.get(unit_id).map(|u| u.status)
  }

  /// Failure reasons for units that did not complete.
  pub fn failures(&self) -> &HashMap<String, String> {
    &self.failed
  }

  /// Everything is settled: nothing in flight, no unit still pending.
  pub fn is_drained(&self) -> bool {
    self.in_flight.is_empty()
      && self
        .units
        .values()
        .all(|u| matches!(u.status, UnitStatus::Completed | UnitStatus::Blocked))
  }

  fn is_ready(&self, unit: &MigrationUnit) -> bool {
    if unit.status != UnitStatus::Pending || self.in_flight.contains(&unit.id) {
      return false;
    }
    unit.dependencies.iter().all(|dep| {
      match self.units.get(dep) {
        Some(dep_unit) => dep_unit.status == UnitStatus::Completed,
        // Dependencies outside the inventory never gate dispatch.
        None => true,
      }
    })
  }

  /// Dispatch up to `max_concurrent - in_flight` ready units, highest
  /// composite score first. Returns how many units were handed off.
  pub async fn tick(&mut self) -> Result<usize, DispatchError> {
    let capacity = self.max_concurrent.saturating_sub(self.in_flight.len());
    if capacity == 0 {
      info!(in_flight = self.in_flight.len(), "dispatcher at capacity");
      return Ok(0);
    }

    let batch: Vec<String> = self
      .order
      .iter()
      .filter(|id| self.units.get(*id).is_some_and(|u| self.is_ready(u)))
      .take(capacity)
      .cloned()
      .collect();

    for unit_id in &batch {
      let Some(unit) = self.units.get_mut(unit_id) else {
        continue;
      };
      unit.status = UnitStatus::InProgress;
      let unit = unit.clone();
      self.in_flight.insert(unit_id.clone());
      info!(
        unit_id = %unit_id,
        in_flight = self.in_flight.len(),
        "unit_dispatched"
      );
      self.hand_off(&unit).await?;
    }

    debug_assert!(self.in_flight.len() <= self.max_concurrent);
    Ok(batch.len())
  }

  async fn hand_off(&self, unit: &MigrationUnit) -> Result<(), DispatchError> {
    match &self.mode {
      DispatchMode::Live {
        queue,
        max_attempts,
      } => {
        let mut message = QueueMessage::new(&unit.id, &unit.path);
        message.metadata = serde_json::json!({
          "module": unit.module,
          "priority": unit.priority,
          "score": unit.score,
        });

        let mut last_error = None;
        for attempt in 1..=*max_attempts {
          match queue.enqueue(&message).await {
            Ok(()) => return Ok(()),
            Err(err) => {
              warn!(
                unit_id = %unit.id,
                attempt,
                error = %err,
                "enqueue failed"
              );
              last_error = Some(err.to_string());
            }
          }
        }
        // Attempt budget exhausted: the unit fails without ever running.
        let _ = self.events_tx.send(CompletionEvent {
          unit_id: unit.id.clone(),
          status: CompletionStatus::Failed,
          error: last_error,
        });
        Ok(())
      }
      DispatchMode::Simulated { dir, delay } => {
        tokio::fs::create_dir_all(dir)
          .await
          .map_err(|source| DispatchError::Io {
            path: dir.clone(),
            source,
          })?;
        let artifact = serde_json::json!({
          "unit_id": unit.id,
          "path": unit.path,
          "module": unit.module,
          "simulated": true,
          "generated": format!("generated/{}.ts", unit.id),
        });
        let path = dir.join(format!("{}.json", unit.id));
        let body = serde_json::to_vec_pretty(&artifact).unwrap_or_default();
        tokio::fs::write(&path, body)
          .await
          .map_err(|source| DispatchError::Io { path, source })?;

        let events = self.events_tx.clone();
        let unit_id = unit.id.clone();
        let delay = *delay;
        tokio::spawn(async move {
          tokio::time::sleep(delay).await;
          let _ = events.send(CompletionEvent {
            unit_id,
            status: CompletionStatus::Completed,
            error: None,
          });
        });
        Ok(())
      }
    }
  }

  /// Apply a completion event: release capacity, copy the terminal status,
  /// and surface newly-gated units when the outcome was not success.
  pub fn handle_event(&mut self, event: CompletionEvent) {
    self.in_flight.remove(&event.unit_id);

    let Some(unit) = self.units.get_mut(&event.unit_id) else {
      warn!(unit_id = %event.unit_id, "completion for unknown unit");
      return;
    };

    match event.status {
      CompletionStatus::Completed => {
        unit.status = UnitStatus::Completed;
        info!(unit_id = %event.unit_id, "unit_completed");
      }
      CompletionStatus::Failed | CompletionStatus::Cancelled | CompletionStatus::TimedOut => {
        unit.status = UnitStatus::Blocked;
        let reason = event
          .error
          .clone()
          .unwrap_or_else(|| format!("{:?}", event.status).to_lowercase());
        warn!(unit_id = %event.unit_id, reason = %reason, "unit_failed");
        self.failed.insert(event.unit_id.clone(), reason);
        self.block_dependents(&event.unit_id);
      }
    }
  }

  /// Mark every transitive dependent of `unit_id` blocked, so nothing
  /// starves silently waiting for a dependency that will never complete.
  fn block_dependents(&mut self, unit_id: &str) {
    let mut frontier = vec![unit_id.to_string()];
    while let Some(current) = frontier.pop() {
      let dependents: Vec<String> = self
        .units
        .values()
        .filter(|u| u.status == UnitStatus::Pending && u.dependencies.contains(&current))
        .map(|u| u.id.clone())
        .collect();
      for dependent in dependents {
        if let Some(unit) = self.units.get_mut(&dependent) {
          unit.status = UnitStatus::Blocked;
          warn!(
            unit_id = %dependent,
            blocked_by = %current,
            "unit newly blocked by upstream failure"
          );
          self
            .failed
            .entry(dependent.clone())
            .or_insert_with(|| format!("blocked by {current}"));
          frontier.push(dependent);
        }
      }
    }
  }

  /// Run until the backlog drains or the token cancels.
  ///
  /// One tick runs to completion before the next event is taken; the loop
  /// is a single select over the completion channel and the token.
  #[instrument(name = "dispatch_run", skip_all)]
  pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), DispatchError> {
    self.tick().await?;

    loop {
      if self.is_drained() {
        info!("dispatch backlog drained");
        return Ok(());
      }
      if self.in_flight.is_empty() {
        // Nothing running and nothing ready: the remaining pending units
        // are unreachable (for example, gated on each other).
        let stuck: Vec<String> = self
          .units
          .values()
          .filter(|u| u.status == UnitStatus::Pending)
          .map(|u| u.id.clone())
          .collect();
        for unit_id in stuck {
          warn!(unit_id = %unit_id, "unit unreachable, marking blocked");
          if let Some(unit) = self.units.get_mut(&unit_id) {
            unit.status = UnitStatus::Blocked;
          }
          self
            .failed
            .entry(unit_id)
            .or_insert_with(|| "unreachable: dependencies never completed".to_string());
        }
        continue;
      }

      tokio::select! {
        Some(event) = self.events_rx.recv() => {
          self.handle_event(event);
          self.tick().await?;
        }
        () = cancel.cancelled() => {
          warn!(in_flight = self.in_flight.len(), "dispatch cancelled");
          return Ok(());
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;

  fn unit(id: &str, deps: &[&str], score: f64) -> MigrationUnit {
    let mut unit = MigrationUnit::new(id, format!("src/m/{id}.php")).with_dependencies(deps);
    unit.score = score;
    unit
  }

  fn simulated(units: Vec<MigrationUnit>, max_concurrent: usize) -> (Dispatcher, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = Dispatcher::new(
      units,
      DispatchMode::Simulated {
        dir: dir.path().to_path_buf(),
        delay: Duration::from_millis(5),
      },
      DispatcherConfig { max_concurrent },
    );
    (dispatcher, dir)
  }

  #[tokio::test]
  async fn capacity_bounds_dispatch() {
    // max_concurrent 2 with three independent units: the third goes out
    // only after a completion frees a slot.
    let (mut dispatcher, _dir) = simulated(
      vec![unit("p", &[], 3.0), unit("q", &[], 2.0), unit("r", &[], 1.0)],
      2,
    );

    let dispatched = dispatcher.tick().await.unwrap();
    assert_eq!(dispatched, 2);
    assert_eq!(dispatcher.in_flight(), 2);

    // Still at capacity: another tick dispatches nothing.
    assert_eq!(dispatcher.tick().await.unwrap(), 0);

    dispatcher.handle_event(CompletionEvent {
      unit_id: "p".to_string(),
      status: CompletionStatus::Completed,
      error: None,
    });
    assert_eq!(dispatcher.tick().await.unwrap(), 1);
    assert_eq!(dispatcher.unit_status("r"), Some(UnitStatus::InProgress));
  }

  #[tokio::test]
  async fn dispatch_order_follows_score() {
    let (mut dispatcher, _dir) = simulated(
      vec![unit("low", &[], 1.0), unit("high", &[], 9.0)],
      1,
    );
    dispatcher.tick().await.unwrap();
    assert_eq!(dispatcher.unit_status("high"), Some(UnitStatus::InProgress));
    assert_eq!(dispatcher.unit_status("low"), Some(UnitStatus::Pending));
  }

  #[tokio::test]
  async fn dependencies_gate_dispatch() {
    let (mut dispatcher, _dir) = simulated(
      vec![unit("a", &[], 1.0), unit("b", &["a"], 9.0)],
      5,
    );
    // b outscores a but is not ready.
    assert_eq!(dispatcher.tick().await.unwrap(), 1);
    assert_eq!(dispatcher.unit_status("b"), Some(UnitStatus::Pending));

    dispatcher.handle_event(CompletionEvent {
      unit_id: "a".to_string(),
      status: CompletionStatus::Completed,
      error: None,
    });
    assert_eq!(dispatcher.tick().await.unwrap(), 1);
    assert_eq!(dispatcher.unit_status("b"), Some(UnitStatus::InProgress));
  }

  #[tokio::test]
  async fn failure_blocks_dependents_but_not_siblings() {
    let (mut dispatcher, _dir) = simulated(
      vec![
        unit("a", &[], 5.0),
        unit("child", &["a"], 4.0),
        unit("grandchild", &["child"], 3.0),
        unit("other", &[], 1.0),
      ],
      1,
    );
    dispatcher.tick().await.unwrap();

    dispatcher.handle_event(CompletionEvent {
      unit_id: "a".to_string(),
      status: CompletionStatus::Failed,
      error: Some("generation fault".to_string()),
    });

    assert_eq!(dispatcher.unit_status("child"), Some(UnitStatus::Blocked));
    assert_eq!(
      dispatcher.unit_status("grandchild"),
      Some(UnitStatus::Blocked)
    );
    // Unrelated work keeps flowing.
    assert_eq!(dispatcher.tick().await.unwrap(), 1);
    assert_eq!(dispatcher.unit_status("other"), Some(UnitStatus::InProgress));
    assert!(dispatcher.failures().contains_key("child"));
  }

  #[tokio::test]
  async fn simulated_run_drains_and_writes_artifacts() {
    let (mut dispatcher, dir) = simulated(
      vec![
        unit("a", &[], 3.0),
        unit("b", &["a"], 2.0),
        unit("c", &["a"], 1.0),
      ],
      2,
    );
    dispatcher.run(CancellationToken::new()).await.unwrap();

    assert!(dispatcher.is_drained());
    for id in ["a", "b", "c"] {
      assert_eq!(dispatcher.unit_status(id), Some(UnitStatus::Completed));
      let body = std::fs::read_to_string(dir.path().join(format!("{id}.json"))).unwrap();
      let artifact: serde_json::Value = serde_json::from_str(&body).unwrap();
      assert_eq!(artifact["simulated"], true);
      assert_eq!(artifact["unit_id"], id);
    }
  }

  struct RejectingQueue;

  #[async_trait]
  impl WorkQueue for RejectingQueue {
    async fn enqueue(&self, _message: &QueueMessage) -> Result<(), DispatchError> {
      Err(DispatchError::Queue("broker unavailable".to_string()))
    }
  }

  #[tokio::test]
  async fn exhausted_enqueue_attempts_fail_the_unit() {
    let mut dispatcher = Dispatcher::new(
      vec![unit("a", &[], 1.0)],
      DispatchMode::Live {
        queue: Arc::new(RejectingQueue),
        max_attempts: 3,
      },
      DispatcherConfig::default(),
    );

    dispatcher.run(CancellationToken::new()).await.unwrap();
    assert_eq!(dispatcher.unit_status("a"), Some(UnitStatus::Blocked));
    assert!(dispatcher.failures()["a"].contains("broker unavailable"));
  }

  #[tokio::test]
  async fn cancellation_stops_the_loop_without_cascading() {
    let (mut dispatcher, _dir) = simulated(vec![unit("a", &[], 1.0)], 1);
    let cancel = CancellationToken::new();
    cancel.cancel();

    dispatcher.run(cancel).await.unwrap();
    // The in-flight unit is left as-is; nothing is marked failed.
    assert!(dispatcher.failures().is_empty());
  }

  #[tokio::test]
  async fn mutually_gated_units_end_blocked_not_stuck() {
    let (mut dispatcher, _dir) = simulated(
      vec![unit("x", &["y"], 1.0), unit("y", &["x"], 1.0)],
      2,
    );
    dispatcher.run(CancellationToken::new()).await.unwrap();
    assert!(dispatcher.is_drained());
    assert_eq!(dispatcher.unit_status("x"), Some(UnitStatus::Blocked));
    assert_eq!(dispatcher.unit_status("y"), Some(UnitStatus::Blocked));
  }
}
