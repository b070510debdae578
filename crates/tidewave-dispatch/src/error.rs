use std::path::PathBuf;

use thiserror::Error;

/// Error type for dispatch operations.
#[derive(Debug, Error)]
pub enum DispatchError {
  /// The work queue rejected a message.
  #[error("queue error: {0}")]
  Queue(String),

  /// A simulation artifact could not be written.
  #[error("failed to write {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// A storage operation failed.
  #[error(transparent)]
  Store(#[from] tidewave_store::Error),
}
