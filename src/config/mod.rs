use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::Semaphore;

use crate::error::{Error, Result};
use crate::util::time::TimestampUnit;

/// Log configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LogConfig {
  /// Log file path, if not set, logs will be printed to stdout
  pub file: Option<PathBuf>,
  /// Log level, default is "info"
  #[serde(default = "default_log_level")]
  pub level: String,
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      file: None,
      level: default_log_level(),
    }
  }
}

/// Batch run configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
  /// Command file
  #[serde(default = "default_input")]
  pub input: PathBuf,

  /// Journal output file
  #[serde(default = "default_output")]
  pub output: PathBuf,

  /// Most command tasks admitted at once; unbounded if not set
  #[serde(default)]
  pub max_concurrency: Option<usize>,

  /// Size of the runtime's blocking thread pool; tokio's default if not set
  #[serde(default)]
  pub blocking_threads: Option<usize>,

  /// Journal timestamp resolution
  #[serde(default)]
  pub timestamp: TimestampUnit,

  /// Log configuration
  #[serde(default)]
  pub log: LogConfig,
}

fn default_input() -> PathBuf {
  PathBuf::from("commands.txt")
}

fn default_output() -> PathBuf {
  PathBuf::from("output.txt")
}

impl Default for Config {
  fn default() -> Self {
    Self {
      input: default_input(),
      output: default_output(),
      max_concurrency: None,
      blocking_threads: None,
      timestamp: TimestampUnit::default(),
      log: LogConfig::default(),
    }
  }
}

impl Config {
  /// Load configuration from TOML file
  pub fn from_file(path: &Path) -> Result<Self> {
    let config_str = fs::read_to_string(path).map_err(|source| Error::Io {
      path: path.to_path_buf(),
      source,
    })?;

    let config: Config = toml::from_str(&config_str).map_err(|source| Error::Config {
      path: path.to_path_buf(),
      source,
    })?;

    config.validate()?;
    Ok(config)
  }

  /// Reject settings that would stall or refuse every run
  pub fn validate(&self) -> Result<()> {
    if self.max_concurrency == Some(0) {
      return Err(Error::InvalidConfig(
        "max_concurrency must be at least 1".to_string(),
      ));
    }
    if let Some(limit) = self.max_concurrency
      && limit > Semaphore::MAX_PERMITS
    {
      return Err(Error::InvalidConfig(format!(
        "max_concurrency must be at most {}",
        Semaphore::MAX_PERMITS
      )));
    }
    if self.blocking_threads == Some(0) {
      return Err(Error::InvalidConfig(
        "blocking_threads must be at least 1".to_string(),
      ));
    }
    Ok(())
  }
}
