//! Time utility functions

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Resolution of journal timestamps
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampUnit {
  /// Whole seconds since the Unix epoch
  Seconds,
  /// Microseconds since the Unix epoch
  #[default]
  Micros,
}

impl TimestampUnit {
  /// Current wall-clock time in this unit
  pub fn now(self) -> u64 {
    match self {
      TimestampUnit::Seconds => now_secs(),
      TimestampUnit::Micros => now_micros(),
    }
  }
}

/// Get the current timestamp in seconds
pub fn now_secs() -> u64 {
  since_epoch().as_secs()
}

/// Get the current timestamp in microseconds
pub fn now_micros() -> u64 {
  since_epoch().as_micros() as u64
}

// A clock set before 1970 reads as the epoch itself.
fn since_epoch() -> std::time::Duration {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
}
