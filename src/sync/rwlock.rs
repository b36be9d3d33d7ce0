//! Writer-preferring reader-writer lock
//!
//! Any number of readers may hold the lock at once, or exactly one writer.
//! As soon as a writer starts waiting, newly arriving readers queue behind it,
//! so a steady stream of readers cannot starve writers.
//!
//! Acquisition hands out an RAII guard and the matching release runs when the
//! guard is dropped. There is no other way to release, so every release pairs
//! with exactly one acquisition.

use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// A lock transition, reported to the observer while the mode is still held
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockEvent {
  ReadAcquired,
  ReadReleased,
  WriteAcquired,
  WriteReleased,
}

impl LockEvent {
  pub fn as_str(&self) -> &'static str {
    match self {
      LockEvent::ReadAcquired => "READ LOCK ACQUIRED",
      LockEvent::ReadReleased => "READ LOCK RELEASED",
      LockEvent::WriteAcquired => "WRITE LOCK ACQUIRED",
      LockEvent::WriteReleased => "WRITE LOCK RELEASED",
    }
  }
}

impl fmt::Display for LockEvent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Receives lock transitions
///
/// Acquire events are delivered after the mode is granted and release events
/// before it is given up, so calls arrive in the real acquisition order.
pub trait LockObserver: Send + Sync {
  fn on_event(&self, event: LockEvent);
}

/// Admission state of the lock
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LockState {
  pub active_readers: usize,
  pub writer_active: bool,
  pub waiting_writers: usize,
}

/// Usage counters across both modes
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LockStats {
  pub acquisitions: u64,
  pub releases: u64,
}

impl LockStats {
  /// True when every acquisition has been released
  pub fn is_balanced(&self) -> bool {
    self.acquisitions == self.releases
  }
}

/// Reader-writer lock protecting a `T`
pub struct RwLock<T> {
  state: Mutex<LockState>,
  /// Readers blocked behind an active or waiting writer
  readers: Condvar,
  /// Writers blocked behind readers or another writer
  writers: Condvar,
  acquisitions: AtomicU64,
  releases: AtomicU64,
  observer: Option<Arc<dyn LockObserver>>,
  data: UnsafeCell<T>,
}

// SAFETY: `data` is only reached through guards. A `WriteGuard` exists only
// while `writer_active` is set, which excludes every other guard, and
// `ReadGuard`s hand out shared references only. This is the same contract
// as `std::sync::RwLock`.
unsafe impl<T: Send> Send for RwLock<T> {}
unsafe impl<T: Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T> {
  /// Create an unobserved lock
  pub fn new(data: T) -> Self {
    Self {
      state: Mutex::new(LockState::default()),
      readers: Condvar::new(),
      writers: Condvar::new(),
      acquisitions: AtomicU64::new(0),
      releases: AtomicU64::new(0),
      observer: None,
      data: UnsafeCell::new(data),
    }
  }

  /// Create a lock that reports its transitions to `observer`
  pub fn with_observer(data: T, observer: Arc<dyn LockObserver>) -> Self {
    let mut lock = Self::new(data);
    lock.observer = Some(observer);
    lock
  }

  /// Acquire shared access, blocking while a writer holds or waits for the lock
  pub fn read(&self) -> ReadGuard<'_, T> {
    let mut state = self.lock_state();
    while state.writer_active || state.waiting_writers > 0 {
      state = self
        .readers
        .wait(state)
        .unwrap_or_else(PoisonError::into_inner);
    }
    state.active_readers += 1;
    drop(state);

    self.acquired(LockEvent::ReadAcquired);
    ReadGuard { lock: self }
  }

  /// Acquire shared access without blocking
  pub fn try_read(&self) -> Option<ReadGuard<'_, T>> {
    let mut state = self.lock_state();
    if state.writer_active || state.waiting_writers > 0 {
      return None;
    }
    state.active_readers += 1;
    drop(state);

    self.acquired(LockEvent::ReadAcquired);
    Some(ReadGuard { lock: self })
  }

  /// Acquire exclusive access, blocking until readers drain and no other
  /// writer holds the lock
  pub fn write(&self) -> WriteGuard<'_, T> {
    let mut state = self.lock_state();
    state.waiting_writers += 1;
    while state.writer_active || state.active_readers > 0 {
      state = self
        .writers
        .wait(state)
        .unwrap_or_else(PoisonError::into_inner);
    }
    state.waiting_writers -= 1;
    state.writer_active = true;
    drop(state);

    self.acquired(LockEvent::WriteAcquired);
    WriteGuard { lock: self }
  }

  /// Acquire exclusive access without blocking
  pub fn try_write(&self) -> Option<WriteGuard<'_, T>> {
    let mut state = self.lock_state();
    if state.writer_active || state.active_readers > 0 {
      return None;
    }
    state.writer_active = true;
    drop(state);

    self.acquired(LockEvent::WriteAcquired);
    Some(WriteGuard { lock: self })
  }

  /// Copy of the current admission state
  pub fn state(&self) -> LockState {
    *self.lock_state()
  }

  /// Acquisition and release counters
  pub fn stats(&self) -> LockStats {
    LockStats {
      acquisitions: self.acquisitions.load(Ordering::Acquire),
      releases: self.releases.load(Ordering::Acquire),
    }
  }

  fn release_read(&self) {
    self.released(LockEvent::ReadReleased);

    let mut state = self.lock_state();
    debug_assert!(state.active_readers > 0, "read release without a read hold");
    state.active_readers -= 1;
    if state.active_readers == 0 {
      self.writers.notify_one();
    }
  }

  fn release_write(&self) {
    self.released(LockEvent::WriteReleased);

    let mut state = self.lock_state();
    debug_assert!(state.writer_active, "write release without a write hold");
    state.writer_active = false;
    if state.waiting_writers > 0 {
      self.writers.notify_one();
    } else {
      self.readers.notify_all();
    }
  }

  fn acquired(&self, event: LockEvent) {
    self.acquisitions.fetch_add(1, Ordering::AcqRel);
    if let Some(observer) = &self.observer {
      observer.on_event(event);
    }
  }

  fn released(&self, event: LockEvent) {
    if let Some(observer) = &self.observer {
      observer.on_event(event);
    }
    self.releases.fetch_add(1, Ordering::AcqRel);
  }

  // The state mutex is never held across user code, so a poisoned state is
  // still consistent.
  fn lock_state(&self) -> MutexGuard<'_, LockState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl<T: Default> Default for RwLock<T> {
  fn default() -> Self {
    Self::new(T::default())
  }
}

impl<T> fmt::Debug for RwLock<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RwLock")
      .field("state", &self.state())
      .field("stats", &self.stats())
      .finish_non_exhaustive()
  }
}

/// Shared access; releases the read hold on drop
pub struct ReadGuard<'a, T> {
  lock: &'a RwLock<T>,
}

impl<T> Deref for ReadGuard<'_, T> {
  type Target = T;

  fn deref(&self) -> &T {
    // SAFETY: a read hold excludes writers, so no `&mut T` is alive.
    unsafe { &*self.lock.data.get() }
  }
}

impl<T> Drop for ReadGuard<'_, T> {
  fn drop(&mut self) {
    self.lock.release_read();
  }
}

/// Exclusive access; releases the write hold on drop
pub struct WriteGuard<'a, T> {
  lock: &'a RwLock<T>,
}

impl<T> Deref for WriteGuard<'_, T> {
  type Target = T;

  fn deref(&self) -> &T {
    // SAFETY: the write hold is exclusive.
    unsafe { &*self.lock.data.get() }
  }
}

impl<T> DerefMut for WriteGuard<'_, T> {
  fn deref_mut(&mut self) -> &mut T {
    // SAFETY: the write hold is exclusive and `&mut self` prevents aliasing
    // through this guard.
    unsafe { &mut *self.lock.data.get() }
  }
}

impl<T> Drop for WriteGuard<'_, T> {
  fn drop(&mut self) {
    self.lock.release_write();
  }
}
