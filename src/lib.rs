//! chashdb: a concurrent in-memory record store driven by command batches
//!
//! Each command of a batch runs on its own blocking task against a single
//! [`store::RecordStore`], guarded by the writer-preferring
//! [`sync::RwLock`]. Every operation and lock transition is appended to a
//! timestamped [`journal::Journal`].

pub mod config;
pub mod engine;
pub mod error;
pub mod journal;
pub mod protocol;
pub mod store;
pub mod sync;
pub mod util;

pub use engine::{Engine, EngineState, Outcome, RunReport};
pub use error::{Error, Result};
