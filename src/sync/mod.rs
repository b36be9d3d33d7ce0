//! Synchronization primitives
//!
//! The store is guarded by a hand-written reader-writer lock rather than
//! `std::sync::RwLock`, whose fairness policy is platform dependent. This one
//! always prefers writers and reports every transition to an observer.

pub mod rwlock;

pub use rwlock::{LockEvent, LockObserver, LockState, LockStats, ReadGuard, RwLock, WriteGuard};
