use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a batch run
#[derive(Debug, Error)]
pub enum Error {
  /// An input or output file could not be opened or read
  #[error("failed to access '{}': {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse config file '{}': {source}", .path.display())]
  Config {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("invalid config: {0}")]
  InvalidConfig(String),

  /// Writing the journal failed part way through the run
  #[error("failed to write journal: {0}")]
  Journal(#[source] io::Error),

  /// A command task panicked; the run is compromised
  #[error("command task failed: {0}")]
  TaskFailed(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
