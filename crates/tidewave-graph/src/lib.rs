//! Tidewave Graph
//!
//! This crate turns per-unit dependency lists and auxiliary cross-reference
//! extracts into a weighted, deduplicated dependency edge set, and detects
//! cycles in that graph.
//!
//! An edge `source -> target` means "source requires target migrated first".
//! Cycles are not fatal: they are surfaced upstream as blockers so the
//! planner can place the affected units in a flagged best-effort wave.

mod builder;
mod cycles;
mod edge;
mod graph;

pub use builder::{build_graph, find_unit_by_path};
pub use cycles::detect_cycles;
pub use edge::{DependencyEdge, EdgeKind};
pub use graph::DependencyGraph;
