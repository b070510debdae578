use serde::{Deserialize, Serialize};

use crate::enums::{BusinessImpact, Priority, SeoImpact, UnitStatus};

/// One file or artifact scheduled for migration.
///
/// Units come from the inventory snapshot. The planner fills in the derived
/// fields (`blocking`, `score`); the dispatcher and pipeline update `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationUnit {
  /// Unique identifier, also used as the graph node id.
  pub id: String,

  /// Source path of the artifact.
  pub path: String,

  #[serde(default)]
  pub priority: Priority,

  /// Normalized complexity in [0, 1].
  #[serde(default = "default_complexity")]
  pub complexity: f64,

  #[serde(default)]
  pub seo_impact: SeoImpact,

  #[serde(default)]
  pub business_impact: BusinessImpact,

  /// Ids of units that must be migrated before this one.
  #[serde(default)]
  pub dependencies: Vec<String>,

  /// Ids of units this one blocks. Derived from reverse edges by the planner.
  #[serde(default)]
  pub blocking: Vec<String>,

  /// Owning module, derived from the path when absent.
  #[serde(default)]
  pub module: String,

  /// Data-model tables this unit touches, used for schema-conflict blockers.
  #[serde(default)]
  pub tables: Vec<String>,

  #[serde(default = "default_effort_hours")]
  pub estimated_effort_hours: f64,

  #[serde(default)]
  pub status: UnitStatus,

  /// Composite score assigned by the planner. Zero until planned.
  #[serde(default)]
  pub score: f64,
}

fn default_complexity() -> f64 {
  0.5
}

fn default_effort_hours() -> f64 {
  4.0
}

impl MigrationUnit {
  /// Create a unit with defaults for everything but id and path.
  pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
    let path = path.into();
    let module = module_for_path(&path);
    Self {
      id: id.into(),
      path,
      priority: Priority::default(),
      complexity: default_complexity(),
      seo_impact: SeoImpact::default(),
      business_impact: BusinessImpact::default(),
      dependencies: Vec::new(),
      blocking: Vec::new(),
      module,
      tables: Vec::new(),
      estimated_effort_hours: default_effort_hours(),
      status: UnitStatus::default(),
      score: 0.0,
    }
  }

  pub fn with_dependencies(mut self, deps: &[&str]) -> Self {
    self.dependencies = deps.iter().map(|d| d.to_string()).collect();
    self
  }
}

/// Derive the owning module from a unit path.
///
/// `src/<module>/...` yields the second segment, `<module>/file` yields the
/// first, anything else falls back to the parent directory or "unknown".
pub fn module_for_path(path: &str) -> String {
  let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();

  if parts.len() > 2 && parts[0] == "src" {
    return parts[1].to_string();
  }
  if parts.len() == 2 {
    return parts[0].to_string();
  }
  if parts.len() >= 2 {
    return parts[parts.len() - 2].to_string();
  }
  "unknown".to_string()
}
