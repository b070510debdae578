use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlannerError {
  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to serialize {doc}: {source}")]
  Serialize {
    doc: &'static str,
    #[source]
    source: serde_json::Error,
  },
}
