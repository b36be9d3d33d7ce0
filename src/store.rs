use std::fmt;
use std::sync::Arc;

use crate::sync::{LockObserver, LockStats, RwLock};

/// Longest name a record keeps, in bytes
pub const MAX_NAME_LEN: usize = 49;

/// Jenkins one-at-a-time hash of a name
///
/// Used as an equality pre-filter and as the sort key of snapshots. Distinct
/// names may collide, so a hash match is always confirmed by name.
pub fn hash(name: &str) -> u32 {
  let mut h: u32 = 0;
  for &b in name.as_bytes() {
    h = h.wrapping_add(u32::from(b));
    h = h.wrapping_add(h << 10);
    h ^= h >> 6;
  }
  h = h.wrapping_add(h << 3);
  h ^= h >> 11;
  h.wrapping_add(h << 15)
}

/// Truncate `name` to [`MAX_NAME_LEN`] bytes on a character boundary
pub fn bound_name(name: &str) -> &str {
  if name.len() <= MAX_NAME_LEN {
    return name;
  }
  let mut end = MAX_NAME_LEN;
  while !name.is_char_boundary(end) {
    end -= 1;
  }
  &name[..end]
}

/// A stored record, or a copy of one handed out to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
  pub key_hash: u32,
  pub name: String,
  pub salary: u32,
}

impl Record {
  fn matches(&self, key_hash: u32, name: &str) -> bool {
    self.key_hash == key_hash && self.name == name
  }
}

/// Formats as `hash,name,salary`
impl fmt::Display for Record {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{},{},{}", self.key_hash, self.name, self.salary)
  }
}

/// Result of an insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
  Inserted,
  Updated,
}

type Link = Option<Box<Node>>;

struct Node {
  record: Record,
  next: Link,
}

/// Singly-linked chain of records, newest at the head
#[derive(Default)]
struct Chain {
  head: Link,
  len: usize,
}

impl Chain {
  fn iter(&self) -> impl Iterator<Item = &Record> {
    std::iter::successors(self.head.as_deref(), |node| node.next.as_deref())
      .map(|node| &node.record)
  }

  fn find(&self, key_hash: u32, name: &str) -> Option<&Record> {
    self.iter().find(|record| record.matches(key_hash, name))
  }

  fn find_mut(&mut self, key_hash: u32, name: &str) -> Option<&mut Record> {
    let mut cur = self.head.as_deref_mut();
    while let Some(node) = cur {
      if node.record.matches(key_hash, name) {
        return Some(&mut node.record);
      }
      cur = node.next.as_deref_mut();
    }
    None
  }

  fn push_front(&mut self, record: Record) {
    let next = self.head.take();
    self.head = Some(Box::new(Node { record, next }));
    self.len += 1;
  }

  fn unlink(&mut self, key_hash: u32, name: &str) -> Option<Record> {
    let mut cur = &mut self.head;
    while cur
      .as_ref()
      .is_some_and(|node| !node.record.matches(key_hash, name))
    {
      cur = &mut cur.as_mut()?.next;
    }

    let mut node = cur.take()?;
    *cur = node.next.take();
    self.len -= 1;
    Some(node.record)
  }
}

impl Drop for Chain {
  // Unlink iteratively; the default recursive drop would overflow the stack
  // on a long chain.
  fn drop(&mut self) {
    let mut cur = self.head.take();
    while let Some(mut node) = cur {
      cur = node.next.take();
    }
  }
}

/// In-memory record store guarded by a writer-preferring lock
pub struct RecordStore {
  chain: RwLock<Chain>,
}

impl RecordStore {
  /// Create a new empty store
  pub fn new() -> Self {
    Self {
      chain: RwLock::new(Chain::default()),
    }
  }

  /// Create an empty store whose lock reports transitions to `observer`
  pub fn with_observer(observer: Arc<dyn LockObserver>) -> Self {
    Self {
      chain: RwLock::with_observer(Chain::default(), observer),
    }
  }

  /// Insert a record, or overwrite the salary of an existing one
  pub fn insert(&self, name: &str, salary: u32) -> InsertOutcome {
    let name = bound_name(name);
    let key_hash = hash(name);

    let mut chain = self.chain.write();
    if let Some(record) = chain.find_mut(key_hash, name) {
      record.salary = salary;
      return InsertOutcome::Updated;
    }
    chain.push_front(Record {
      key_hash,
      name: name.to_string(),
      salary,
    });
    InsertOutcome::Inserted
  }

  /// Look up a record by name, returning a copy
  pub fn search(&self, name: &str) -> Option<Record> {
    self.search_with(name, |record| record)
  }

  /// Look up a record by name and hand a copy to `f` while the read lock
  /// is still held
  pub fn search_with<R>(&self, name: &str, f: impl FnOnce(Option<Record>) -> R) -> R {
    let name = bound_name(name);
    let key_hash = hash(name);

    let chain = self.chain.read();
    f(chain.find(key_hash, name).cloned())
  }

  /// Remove a record by name, returning it if it was present
  pub fn delete(&self, name: &str) -> Option<Record> {
    self.delete_with(name, |record| record)
  }

  /// Remove a record by name and hand it to `f` while the write lock is
  /// still held
  pub fn delete_with<R>(&self, name: &str, f: impl FnOnce(Option<Record>) -> R) -> R {
    let name = bound_name(name);
    let key_hash = hash(name);

    let mut chain = self.chain.write();
    f(chain.unlink(key_hash, name))
  }

  /// All records ascending by hash, ties in insertion order
  pub fn snapshot_sorted(&self) -> Vec<Record> {
    self.snapshot_sorted_with(|records| records)
  }

  /// Take the sorted snapshot and hand it to `f` while the read lock is
  /// still held
  pub fn snapshot_sorted_with<R>(&self, f: impl FnOnce(Vec<Record>) -> R) -> R {
    let chain = self.chain.read();
    let mut records: Vec<Record> = chain.iter().cloned().collect();
    // The chain runs newest first; reverse into insertion order so the stable
    // sort keeps it for equal hashes.
    records.reverse();
    records.sort_by_key(|record| record.key_hash);
    f(records)
  }

  /// Number of live records
  pub fn len(&self) -> usize {
    self.chain.read().len
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Acquisition and release counters of the store lock
  pub fn lock_stats(&self) -> LockStats {
    self.chain.stats()
  }
}

impl Default for RecordStore {
  fn default() -> Self {
    Self::new()
  }
}
