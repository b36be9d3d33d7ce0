//! Timestamped, append-only output of a batch run
//!
//! Every event line is `<timestamp>,<event>`. Lines are appended under the
//! journal's own mutex, so a line (or a listing block) is never torn by a
//! concurrent append, and the timestamp is taken under the same mutex and
//! clamped so the file never goes backwards in time.

use std::fmt::Display;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::error::{Error, Result};
use crate::store::Record;
use crate::sync::{LockEvent, LockObserver, LockStats};
use crate::util::time::TimestampUnit;

/// Line written in place of a report when the batch has no commands
pub const NO_COMMANDS: &str = "No commands found to execute.";

struct Inner {
  sink: Box<dyn Write + Send>,
  last_ts: u64,
  /// First write failure; later appends are dropped
  error: Option<io::Error>,
}

pub struct Journal {
  inner: Mutex<Inner>,
  unit: TimestampUnit,
}

impl Journal {
  /// Journal writing to any sink
  pub fn new(sink: impl Write + Send + 'static, unit: TimestampUnit) -> Self {
    Self {
      inner: Mutex::new(Inner {
        sink: Box::new(sink),
        last_ts: 0,
        error: None,
      }),
      unit,
    }
  }

  /// Create (or truncate) the output file at `path`
  pub fn create(path: &Path, unit: TimestampUnit) -> Result<Self> {
    let file = File::create(path).map_err(|source| Error::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Ok(Self::new(BufWriter::new(file), unit))
  }

  /// Append `<timestamp>,<event>`
  pub fn event(&self, event: impl Display) {
    let mut inner = self.lock();
    let ts = self.unit.now().max(inner.last_ts);
    inner.last_ts = ts;
    inner.write_line(format_args!("{ts},{event}"));
  }

  /// Append an untimestamped line
  pub fn line(&self, line: impl Display) {
    self.lock().write_line(line);
  }

  /// Append a `hash,name,salary` listing as one uninterrupted block
  pub fn listing(&self, records: &[Record]) {
    let mut inner = self.lock();
    for record in records {
      inner.write_line(record);
    }
  }

  /// Append the end-of-run block: lock counters then the final listing
  pub fn summary(&self, stats: LockStats, records: &[Record]) {
    let mut inner = self.lock();
    inner.write_line("Finished all threads.");
    inner.write_line(format_args!(
      "Number of lock acquisitions: {}",
      stats.acquisitions
    ));
    inner.write_line(format_args!("Number of lock releases: {}", stats.releases));
    for record in records {
      inner.write_line(record);
    }
  }

  /// Flush the sink and surface the first write failure, if any
  pub fn finish(&self) -> Result<()> {
    let mut inner = self.lock();
    if let Some(err) = inner.error.take() {
      return Err(Error::Journal(err));
    }
    inner.sink.flush().map_err(Error::Journal)
  }

  // Appends never panic while holding the mutex, so a poisoned journal is
  // still usable.
  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl Inner {
  fn write_line(&mut self, line: impl Display) {
    if self.error.is_some() {
      return;
    }
    if let Err(err) = writeln!(self.sink, "{line}") {
      warn!("Failed to append to journal: {}", err);
      self.error = Some(err);
    }
  }
}

impl LockObserver for Journal {
  fn on_event(&self, event: LockEvent) {
    self.event(event);
  }
}
