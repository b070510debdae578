//! Tidewave Dispatch
//!
//! Readiness-gated dispatch of migration units.
//!
//! ```text
//!              ready = deps completed, not in flight
//! ┌────────────┐  tick   ┌─────────────┐  QueueMessage  ┌─────────────┐
//! │ Dispatcher │────────►│  WorkQueue  │───────────────►│ QueueWorker │
//! └────────────┘         └─────────────┘                └──────┬──────┘
//!       ▲                                                      │ execute
//!       │          CompletionEvent { unit_id, status }         ▼
//!       └──────────────────────────────────────────────── backend
//! ```
//!
//! The [`Dispatcher`] holds the backlog and hands ready units off, bounded
//! by `max_concurrent`. In live mode the hand-off is a durable queue
//! message drained by a [`QueueWorker`]; in simulated mode it is a
//! deterministic artifact plus a synthetic completion, which lets a plan be
//! rehearsed with no backend at all.

mod dispatcher;
mod error;
mod queue;
mod worker;

pub use dispatcher::{
  CompletionEvent, CompletionStatus, DispatchMode, Dispatcher, DispatcherConfig,
};
pub use error::DispatchError;
pub use queue::{DEFAULT_MAX_ATTEMPTS, QueueMessage, StoreQueue, WorkQueue};
pub use worker::{QueueWorker, QueueWorkerConfig};
