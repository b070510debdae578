//! Tidewave Inventory
//!
//! This crate contains the serializable data model for migration work units
//! and the snapshot documents a planning run consumes. These types represent
//! the backlog before it is ordered and scheduled by the planner.
//!
//! Snapshot documents are loaded from:
//! - an inventory file listing every unit with dependencies and metadata
//! - zero or more cross-reference extracts contributing inferred edges
//! - a schema-conflict document flagging broken data-model elements
//! - a routing document flagging unmigrated critical routes
//! - a prior-run status document (unit id -> last status)
//!
//! All documents are read once per run as immutable snapshots. A fresh run
//! supersedes the previous snapshot; units are never deleted in place.

mod enums;
mod error;
mod snapshot;
mod unit;

pub use enums::{BusinessImpact, Priority, SeoImpact, UnitStatus};
pub use error::InventoryError;
pub use snapshot::{
  CrossRefDoc, CrossRefEntry, CrossRefTarget, RouteDoc, RouteRule, SchemaConflictDoc, Snapshot,
  StatusDoc, TableConflict,
};
pub use unit::{MigrationUnit, module_for_path};
