//! Tidewave Planner
//!
//! This crate scores migration units, partitions the backlog into ordered
//! waves respecting dependency readiness and priority, analyses blockers,
//! and renders the per-run output documents.
//!
//! # Architecture
//!
//! ```text
//! units + edges
//!      │
//!      ▼
//! ┌──────────────┐   cycles, schema, routes, prior status
//! │   blockers   │◄──────────────────────────────────────
//! └──────────────┘
//!      │
//!      ▼
//! ┌──────────────┐  score, sort, greedy readiness batching
//! │     plan     │──► WavePlan (ordered waves + totals)
//! └──────────────┘
//!      │
//!      ▼
//! ┌──────────────┐  wave-plan / graph / blockers / dashboard
//! │    report    │──► JSON documents, written once per run
//! └──────────────┘
//! ```
//!
//! Determinism: identical inputs yield identical wave assignment. Sorting is
//! by composite score descending with unit id as the tie-break, and blocker
//! ids are derived from their inputs rather than clocks or randomness.

mod blockers;
mod error;
mod plan;
mod report;
mod score;

pub use blockers::{Blocker, BlockerInputs, BlockerKind, Severity, detect_blockers};
pub use error::PlannerError;
pub use plan::{PlannerConfig, Wave, WavePlan, WaveStatus, plan};
pub use report::{
  DashboardSummary, GraphDoc, GraphLink, GraphNode, ModuleProgress, WaveSummary, build_dashboard,
  build_graph_doc, write_documents,
};
pub use score::{annotate_blocking, composite_score};
