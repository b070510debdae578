use serde::{Deserialize, Serialize};

/// Kind of relationship an edge was inferred from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
  #[default]
  Include,
  Call,
  Sql,
  Route,
  Inheritance,
}

impl EdgeKind {
  /// Parse a cross-reference kind hint; unknown hints fall back to Include.
  pub fn parse(hint: &str) -> Self {
    match hint {
      "call" => EdgeKind::Call,
      "sql" => EdgeKind::Sql,
      "route" => EdgeKind::Route,
      "inheritance" => EdgeKind::Inheritance,
      _ => EdgeKind::Include,
    }
  }
}

/// A directed dependency edge: `source` requires `target` migrated first.
///
/// Weight is 1-10 and holds the max observed weight across all reporting
/// sources for the (source, target) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
  pub source: String,
  pub target: String,
  pub weight: u8,
  pub kind: EdgeKind,
}

impl DependencyEdge {
  pub fn new(
    source: impl Into<String>,
    target: impl Into<String>,
    weight: u8,
    kind: EdgeKind,
  ) -> Self {
    Self {
      source: source.into(),
      target: target.into(),
      weight: weight.clamp(1, 10),
      kind,
    }
  }
}
