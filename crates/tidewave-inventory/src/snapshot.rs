//! Snapshot documents consumed by a planning run.
//!
//! Every document is read once and treated as immutable for the run. Only
//! the inventory itself is mandatory; the auxiliary documents degrade to
//! empty data with a warning when missing, matching how operators actually
//! run partial analyses.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::enums::UnitStatus;
use crate::error::InventoryError;
use crate::unit::{MigrationUnit, module_for_path};

/// A cross-reference extract contributed by an auxiliary analysis pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossRefDoc {
  #[serde(default)]
  pub entries: Vec<CrossRefEntry>,
}

/// Cross-reference data for one source unit.
///
/// `unit` is a best-effort hint: it may be an exact unit id, a path, or a
/// bare file name. The graph builder resolves it with a fallible lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossRefEntry {
  pub unit: String,
  #[serde(default)]
  pub depends_on: Vec<CrossRefTarget>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossRefTarget {
  pub path: String,
  #[serde(default)]
  pub critical: bool,
  #[serde(default)]
  pub kind: Option<String>,
}

/// Schema-conflict document flagging broken data-model elements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaConflictDoc {
  #[serde(default)]
  pub tables: HashMap<String, TableConflict>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConflict {
  pub status: String,
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub severity: Option<String>,
  #[serde(default)]
  pub suggestion: Option<String>,
}

impl TableConflict {
  /// Only "error" and "conflict" states block migration work.
  pub fn is_blocking(&self) -> bool {
    matches!(self.status.as_str(), "error" | "conflict")
  }
}

/// Routing document flagging units behind unmigrated critical routes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteDoc {
  #[serde(default)]
  pub rules: Vec<RouteRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRule {
  pub pattern: String,
  #[serde(default)]
  pub seo_impact: Option<String>,
  #[serde(default)]
  pub migrated: bool,
}

/// Prior-run status document: unit id -> last observed status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusDoc {
  #[serde(default)]
  pub units: HashMap<String, UnitStatus>,
}

/// Everything a planning run reads, assembled once.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
  pub units: Vec<MigrationUnit>,
  pub cross_refs: Vec<CrossRefDoc>,
  pub schema_conflicts: SchemaConflictDoc,
  pub routes: RouteDoc,
  pub prior_status: StatusDoc,
}

impl Snapshot {
  /// Load the inventory plus any auxiliary documents.
  ///
  /// The inventory path is mandatory; every other document is optional and
  /// an absent file degrades to empty data with a warning.
  pub fn load(
    inventory: &Path,
    cross_refs: &[impl AsRef<Path>],
    schema: Option<&Path>,
    routes: Option<&Path>,
    prior_status: Option<&Path>,
  ) -> Result<Self, InventoryError> {
    if !inventory.exists() {
      return Err(InventoryError::InventoryNotFound(inventory.to_path_buf()));
    }
    let mut units: Vec<MigrationUnit> = read_json(inventory)?;
    for unit in &mut units {
      if unit.module.is_empty() {
        unit.module = module_for_path(&unit.path);
      }
    }
    info!(units = units.len(), "inventory loaded");

    let mut snapshot = Snapshot {
      units,
      ..Snapshot::default()
    };

    for path in cross_refs {
      let path = path.as_ref();
      match read_optional(path)? {
        Some(doc) => snapshot.cross_refs.push(doc),
        None => warn!(path = %path.display(), "cross-reference document missing, skipped"),
      }
    }

    if let Some(path) = schema {
      match read_optional(path)? {
        Some(doc) => snapshot.schema_conflicts = doc,
        None => warn!(path = %path.display(), "schema-conflict document missing, continuing"),
      }
    }

    if let Some(path) = routes {
      match read_optional(path)? {
        Some(doc) => snapshot.routes = doc,
        None => warn!(path = %path.display(), "routing document missing, continuing"),
      }
    }

    if let Some(path) = prior_status {
      match read_optional(path)? {
        Some(doc) => snapshot.prior_status = doc,
        None => warn!(path = %path.display(), "status document missing, continuing"),
      }
    }

    snapshot.apply_prior_status();
    Ok(snapshot)
  }

  /// Merge the prior-run status document into the unit list so completed
  /// units stay completed across runs.
  pub fn apply_prior_status(&mut self) {
    if self.prior_status.units.is_empty() {
      return;
    }
    for unit in &mut self.units {
      if let Some(status) = self.prior_status.units.get(&unit.id) {
        unit.status = *status;
      }
    }
  }

  /// Index units by id.
  pub fn unit_index(&self) -> HashMap<&str, &MigrationUnit> {
    self.units.iter().map(|u| (u.id.as_str(), u)).collect()
  }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, InventoryError> {
  let raw = fs::read_to_string(path).map_err(|source| InventoryError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  serde_json::from_str(&raw).map_err(|source| InventoryError::Parse {
    path: path.to_path_buf(),
    source,
  })
}

fn read_optional<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, InventoryError> {
  if !path.exists() {
    return Ok(None);
  }
  read_json(path).map(Some)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut f = fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
  }

  #[test]
  fn missing_inventory_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let err = Snapshot::load(
      &dir.path().join("nope.json"),
      &[] as &[&Path],
      None,
      None,
      None,
    )
    .unwrap_err();
    assert!(matches!(err, InventoryError::InventoryNotFound(_)));
  }

  #[test]
  fn missing_auxiliary_documents_are_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let inv = write_file(
      &dir,
      "inventory.json",
      r#"[{"id": "a", "path": "src/shop/a.php"}]"#,
    );
    let snapshot = Snapshot::load(
      &inv,
      &[dir.path().join("xref.json")],
      Some(&dir.path().join("schema.json")),
      Some(&dir.path().join("routes.json")),
      Some(&dir.path().join("status.json")),
    )
    .unwrap();
    assert_eq!(snapshot.units.len(), 1);
    assert!(snapshot.cross_refs.is_empty());
    assert!(snapshot.schema_conflicts.tables.is_empty());
  }

  #[test]
  fn prior_status_is_merged() {
    let dir = tempfile::tempdir().unwrap();
    let inv = write_file(
      &dir,
      "inventory.json",
      r#"[{"id": "a", "path": "a.php"}, {"id": "b", "path": "b.php"}]"#,
    );
    let status = write_file(&dir, "status.json", r#"{"units": {"a": "completed"}}"#);
    let snapshot = Snapshot::load(&inv, &[] as &[&Path], None, None, Some(&status)).unwrap();
    assert_eq!(snapshot.units[0].status, UnitStatus::Completed);
    assert_eq!(snapshot.units[1].status, UnitStatus::Pending);
  }

  #[test]
  fn malformed_inventory_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let inv = write_file(&dir, "inventory.json", "not json");
    let err = Snapshot::load(&inv, &[] as &[&Path], None, None, None).unwrap_err();
    assert!(matches!(err, InventoryError::Parse { .. }));
  }
}
