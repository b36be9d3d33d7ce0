use std::fmt;

use crate::store::bound_name;

/// Store operation named by a command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
  Insert,
  Search,
  Delete,
  Print,
}

impl Op {
  /// Parse an operation name, ignoring case
  fn from_name(name: &str) -> Option<Self> {
    match name.to_ascii_lowercase().as_str() {
      "insert" => Some(Op::Insert),
      "search" => Some(Op::Search),
      "delete" => Some(Op::Delete),
      "print" => Some(Op::Print),
      _ => None,
    }
  }
}

/// A parsed command; `salary` is only meaningful for inserts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
  pub op: Op,
  pub name: String,
  pub salary: u32,
}

impl Command {
  pub fn insert(name: impl Into<String>, salary: u32) -> Self {
    Self::new(Op::Insert, name.into(), salary)
  }

  pub fn search(name: impl Into<String>) -> Self {
    Self::new(Op::Search, name.into(), 0)
  }

  pub fn delete(name: impl Into<String>) -> Self {
    Self::new(Op::Delete, name.into(), 0)
  }

  pub fn print() -> Self {
    Self::new(Op::Print, String::new(), 0)
  }

  fn new(op: Op, mut name: String, salary: u32) -> Self {
    let bounded = bound_name(&name).len();
    name.truncate(bounded);
    Self { op, name, salary }
  }

  /// Parse one `operation,name[,salary]` line
  ///
  /// Returns `None` for anything malformed: unknown operation, missing or
  /// empty name, missing or non-numeric salary on an insert. Fields past the
  /// ones an operation needs are ignored.
  pub fn parse_line(line: &str) -> Option<Self> {
    let mut fields = line.split(',').map(str::trim);
    let op = Op::from_name(fields.next()?)?;
    let mut name = || fields.next().filter(|name| !name.is_empty());

    match op {
      Op::Insert => {
        let name = name()?;
        let salary = fields.next()?.parse().ok()?;
        Some(Command::insert(name, salary))
      }
      Op::Search => Some(Command::search(name()?)),
      Op::Delete => Some(Command::delete(name()?)),
      Op::Print => Some(Command::print()),
    }
  }
}

/// Formats the way the journal records the command
impl fmt::Display for Command {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.op {
      Op::Insert => write!(f, "INSERT,{},{}", self.name, self.salary),
      Op::Search => write!(f, "SEARCH,{}", self.name),
      Op::Delete => write!(f, "DELETE,{}", self.name),
      Op::Print => f.write_str("PRINT"),
    }
  }
}
