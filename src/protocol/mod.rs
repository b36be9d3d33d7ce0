//! Command file protocol
//!
//! The input is line-oriented CSV, `operation,name[,salary]`, optionally led
//! by a `threads,<n>` control line.

pub mod command;
pub mod parser;

pub use command::{Command, Op};
pub use parser::{CommandBatch, Parser};
