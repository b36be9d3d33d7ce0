use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::protocol::command::Command;

/// A parsed command file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandBatch {
  /// Thread count from a leading `threads,<n>` line; informational only
  pub threads: Option<usize>,
  pub commands: Vec<Command>,
  /// Lines dropped as malformed
  pub skipped: usize,
}

impl CommandBatch {
  pub fn is_empty(&self) -> bool {
    self.commands.is_empty()
  }
}

/// Parser for the line-oriented command file
pub struct Parser;

impl Parser {
  /// Read and parse the command file at `path`
  pub fn parse_file(path: &Path) -> Result<CommandBatch> {
    let bytes = fs::read(path).map_err(|source| Error::Io {
      path: path.to_path_buf(),
      source,
    })?;
    info!("Opened {} successfully", path.display());

    let batch = Self::parse_bytes(&bytes);
    info!(
      "Total commands parsed: {} (skipped {})",
      batch.commands.len(),
      batch.skipped
    );
    Ok(batch)
  }

  /// Parse command file contents
  ///
  /// Blank lines are ignored. Only the first non-blank line may be a
  /// `threads,<n>` control line; anywhere else it is malformed.
  pub fn parse(text: &str) -> CommandBatch {
    Self::parse_lines(text.lines().map(Some))
  }

  /// Parse raw command file contents
  ///
  /// Lines are decoded one at a time; a line that is not valid UTF-8 is
  /// skipped like any other malformed line.
  pub fn parse_bytes(bytes: &[u8]) -> CommandBatch {
    Self::parse_lines(bytes.split(|&b| b == b'\n').map(|line| {
      let line = line.strip_suffix(b"\r").unwrap_or(line);
      std::str::from_utf8(line).ok()
    }))
  }

  /// `None` items are lines that could not be decoded
  fn parse_lines<'a>(lines: impl Iterator<Item = Option<&'a str>>) -> CommandBatch {
    let mut batch = CommandBatch::default();
    let mut lines = lines
      .filter(|line| line.is_none_or(|line| !line.trim().is_empty()))
      .peekable();

    if let Some(threads) = lines.peek().copied().flatten().and_then(Self::parse_threads) {
      batch.threads = Some(threads);
      lines.next();
    }

    for line in lines {
      let Some(line) = line else {
        debug!("Skipping command line that is not valid UTF-8");
        batch.skipped += 1;
        continue;
      };
      match Command::parse_line(line) {
        Some(command) => batch.commands.push(command),
        None => {
          debug!("Skipping malformed command line: {:?}", line);
          batch.skipped += 1;
        }
      }
    }

    batch
  }

  fn parse_threads(line: &str) -> Option<usize> {
    let mut fields = line.split(',').map(str::trim);
    if !fields.next()?.eq_ignore_ascii_case("threads") {
      return None;
    }
    fields.next()?.parse().ok()
  }
}
