use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::error::Result;
use crate::journal::{Journal, NO_COMMANDS};
use crate::protocol::{Command, CommandBatch, Op};
use crate::store::{InsertOutcome, Record, RecordStore};
use crate::sync::LockStats;

/// Lifecycle of a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
  Idle,
  Dispatching,
  Awaiting,
  Finalized,
}

/// What a single command did to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
  Insert(InsertOutcome),
  SearchHit(Record),
  SearchMiss,
  Deleted(Record),
  DeleteMiss,
  /// Snapshot taken by a `print` command
  Printed(Vec<Record>),
}

/// Result of a finalized run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
  /// Thread count announced by the command file
  pub threads: Option<usize>,
  /// Outcomes in command order, whatever order the tasks actually ran in
  pub outcomes: Vec<Outcome>,
  /// Final store contents, ascending by hash
  pub records: Vec<Record>,
  pub stats: LockStats,
  /// State the engine ended in; `Finalized` for every completed run
  pub state: EngineState,
}

/// Runs a command batch, one task per command, against a fresh store
pub struct Engine {
  store: Arc<RecordStore>,
  journal: Arc<Journal>,
  max_concurrency: Option<usize>,
  state: EngineState,
}

impl Engine {
  /// Create an engine whose store lock transitions go to `journal`
  pub fn new(journal: Arc<Journal>) -> Self {
    let store = Arc::new(RecordStore::with_observer(journal.clone()));
    Self {
      store,
      journal,
      max_concurrency: None,
      state: EngineState::Idle,
    }
  }

  /// Admit at most `limit` command tasks at a time, in command order
  ///
  /// With a limit of one the batch runs strictly in file order.
  pub fn with_max_concurrency(mut self, limit: Option<usize>) -> Self {
    self.max_concurrency = limit;
    self
  }

  /// Execute `batch` and write the final report
  pub async fn run(mut self, batch: CommandBatch) -> Result<RunReport> {
    if let Some(threads) = batch.threads {
      info!("Running {} threads", threads);
    }

    if batch.is_empty() {
      info!("No commands to execute");
      self.journal.line(NO_COMMANDS);
      self.journal.finish()?;
      self.transition(EngineState::Finalized);
      return Ok(RunReport {
        threads: batch.threads,
        outcomes: Vec::new(),
        records: Vec::new(),
        stats: self.store.lock_stats(),
        state: self.state,
      });
    }

    self.transition(EngineState::Dispatching);
    let limiter = self.max_concurrency.map(|limit| Arc::new(Semaphore::new(limit)));
    let mut handles = Vec::with_capacity(batch.commands.len());

    for command in batch.commands {
      // The semaphore is never closed, so acquiring only waits.
      let permit = match &limiter {
        Some(limiter) => Arc::clone(limiter).acquire_owned().await.ok(),
        None => None,
      };

      let store = Arc::clone(&self.store);
      let journal = Arc::clone(&self.journal);

      // Spawn an independent blocking task for each command
      handles.push(tokio::task::spawn_blocking(move || {
        let _permit = permit;
        execute(&command, &store, &journal)
      }));
    }
    info!("Dispatched {} command tasks", handles.len());

    self.transition(EngineState::Awaiting);
    let outcomes = join_all(handles)
      .await
      .into_iter()
      .collect::<std::result::Result<Vec<_>, _>>()?;

    // Every task has joined, so nothing can mutate the store any more.
    let records = self.store.snapshot_sorted();
    let stats = self.store.lock_stats();
    self.journal.summary(stats, &records);
    self.journal.finish()?;
    self.transition(EngineState::Finalized);

    info!(
      "Finished {} commands, {} records, {} lock acquisitions, {} releases",
      outcomes.len(),
      records.len(),
      stats.acquisitions,
      stats.releases
    );

    Ok(RunReport {
      threads: batch.threads,
      outcomes,
      records,
      stats,
      state: self.state,
    })
  }

  fn transition(&mut self, next: EngineState) {
    debug!("Engine state {:?} -> {:?}", self.state, next);
    self.state = next;
  }
}

/// Run one command against the store, journaling the command and its outcome
///
/// Outcome lines and print listings are appended inside the critical section,
/// so they land between the lock lines of the operation that produced them.
fn execute(command: &Command, store: &RecordStore, journal: &Journal) -> Outcome {
  journal.event(command);

  let outcome = match command.op {
    Op::Insert => Outcome::Insert(store.insert(&command.name, command.salary)),
    Op::Search => store.search_with(&command.name, |found| match found {
      Some(record) => {
        journal.event(format_args!("FOUND,{record}"));
        Outcome::SearchHit(record)
      }
      None => {
        journal.event(format_args!("NOT FOUND,{}", command.name));
        Outcome::SearchMiss
      }
    }),
    Op::Delete => store.delete_with(&command.name, |removed| match removed {
      Some(record) => {
        journal.event(format_args!("DELETED,{record}"));
        Outcome::Deleted(record)
      }
      None => {
        journal.event(format_args!("NOT FOUND,{}", command.name));
        Outcome::DeleteMiss
      }
    }),
    Op::Print => store.snapshot_sorted_with(|records| {
      journal.listing(&records);
      Outcome::Printed(records)
    }),
  };

  debug!("{} -> {:?}", command, outcome);
  outcome
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::journal::tests::SharedBuf;
  use crate::store::hash;
  use crate::util::time::TimestampUnit;

  fn engine() -> (Engine, SharedBuf) {
    let buf = SharedBuf::default();
    let journal = Arc::new(Journal::new(buf.clone(), TimestampUnit::Micros));
    (Engine::new(journal), buf)
  }

  fn batch(commands: Vec<Command>) -> CommandBatch {
    CommandBatch {
      commands,
      ..CommandBatch::default()
    }
  }

  fn scenario() -> Vec<Command> {
    vec![
      Command::insert("alice", 100),
      Command::insert("bob", 200),
      Command::insert("alice", 150),
      Command::delete("bob"),
      Command::search("alice"),
    ]
  }

  /// Journal lines with the timestamp column stripped
  fn events(contents: &str) -> Vec<String> {
    contents
      .lines()
      .filter_map(|line| line.split_once(','))
      .filter(|(ts, _)| ts.parse::<u64>().is_ok())
      .map(|(_, event)| event.to_string())
      .collect()
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_scenario_in_command_order() {
    let (engine, buf) = engine();
    let report = engine
      .with_max_concurrency(Some(1))
      .run(batch(scenario()))
      .await
      .unwrap();

    let alice = Record {
      key_hash: hash("alice"),
      name: "alice".to_string(),
      salary: 150,
    };
    assert_eq!(report.records, vec![alice.clone()]);
    assert_eq!(
      report.outcomes,
      vec![
        Outcome::Insert(InsertOutcome::Inserted),
        Outcome::Insert(InsertOutcome::Inserted),
        Outcome::Insert(InsertOutcome::Updated),
        Outcome::Deleted(Record {
          key_hash: hash("bob"),
          name: "bob".to_string(),
          salary: 200,
        }),
        Outcome::SearchHit(alice),
      ]
    );
    assert_eq!(report.state, EngineState::Finalized);
    assert!(report.stats.is_balanced());
    // Five commands plus the final snapshot.
    assert_eq!(report.stats.acquisitions, 6);

    let events = events(&buf.contents());
    assert!(events.contains(&format!("DELETED,{},bob,200", hash("bob"))));
    assert!(events.contains(&"FOUND,1031422857,alice,150".to_string()));
    assert!(!events.iter().any(|e| e.starts_with("NOT FOUND")));

    let contents = buf.contents();
    assert!(contents.ends_with(
      "Finished all threads.\n\
       Number of lock acquisitions: 6\n\
       Number of lock releases: 6\n\
       1031422857,alice,150\n"
    ));
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_scenario_unordered() {
    let (engine, buf) = engine();
    let report = engine.run(batch(scenario())).await.unwrap();

    // Only interleaving-independent facts hold here.
    assert!(report.stats.is_balanced());
    assert_eq!(report.stats.acquisitions, 6);
    assert_eq!(report.outcomes.len(), 5);

    let alice = report.records.iter().find(|r| r.name == "alice").unwrap();
    assert!(alice.salary == 100 || alice.salary == 150);
    if let Some(bob) = report.records.iter().find(|r| r.name == "bob") {
      assert_eq!(bob.salary, 200);
    }
    assert!(matches!(report.outcomes[4], Outcome::SearchHit(_) | Outcome::SearchMiss));

    let events = events(&buf.contents());
    let acquired = events.iter().filter(|e| e.ends_with("LOCK ACQUIRED")).count();
    let released = events.iter().filter(|e| e.ends_with("LOCK RELEASED")).count();
    assert_eq!(acquired, 6);
    assert_eq!(released, 6);
  }

  #[tokio::test]
  async fn test_empty_batch() {
    let (engine, buf) = engine();
    let report = engine.run(CommandBatch::default()).await.unwrap();

    assert_eq!(report.state, EngineState::Finalized);
    assert_eq!(report.stats, LockStats::default());
    assert!(report.records.is_empty());
    assert_eq!(buf.contents(), format!("{NO_COMMANDS}\n"));
  }

  #[tokio::test]
  async fn test_delete_missing_logs_not_found() {
    let (engine, buf) = engine();
    let report = engine
      .with_max_concurrency(Some(1))
      .run(batch(vec![
        Command::insert("alice", 100),
        Command::delete("bob"),
      ]))
      .await
      .unwrap();

    assert_eq!(report.outcomes[1], Outcome::DeleteMiss);
    assert_eq!(report.records.len(), 1);
    assert!(events(&buf.contents()).contains(&"NOT FOUND,bob".to_string()));
  }

  #[tokio::test]
  async fn test_print_emits_snapshot_inline() {
    let (engine, buf) = engine();
    let report = engine
      .with_max_concurrency(Some(1))
      .run(batch(vec![
        Command::insert("bob", 200),
        Command::insert("alice", 100),
        Command::print(),
        Command::delete("bob"),
      ]))
      .await
      .unwrap();

    match &report.outcomes[2] {
      Outcome::Printed(records) => {
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        // alice hashes below bob
        assert_eq!(names, vec!["alice", "bob"]);
      }
      other => panic!("Expected print outcome, got {:?}", other),
    }

    let contents = buf.contents();
    let listing = format!(
      "{},alice,100\n{},bob,200\n",
      hash("alice"),
      hash("bob")
    );
    assert!(contents.contains(&listing));
    assert_eq!(report.records.len(), 1);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_many_distinct_inserts() {
    let (engine, _buf) = engine();
    let commands = (0..200u32)
      .map(|i| Command::insert(format!("name{i}"), i))
      .collect();
    let report = engine.run(batch(commands)).await.unwrap();

    assert_eq!(report.records.len(), 200);
    for record in &report.records {
      let i: u32 = record.name.trim_start_matches("name").parse().unwrap();
      assert_eq!(record.salary, i);
    }
    assert!(report.records.windows(2).all(|w| w[0].key_hash <= w[1].key_hash));
    assert!(report.stats.is_balanced());
    assert_eq!(report.stats.acquisitions, 201);
  }

  #[tokio::test]
  async fn test_outcome_lines_inside_lock_lines() {
    let (engine, buf) = engine();
    engine
      .with_max_concurrency(Some(1))
      .run(batch(vec![
        Command::insert("alice", 100),
        Command::search("alice"),
        Command::delete("bob"),
        Command::print(),
      ]))
      .await
      .unwrap();

    let contents = buf.contents();
    let lines: Vec<&str> = contents.lines().collect();
    let position = |needle: &str, from: usize| {
      from + lines[from..].iter().position(|l| l.ends_with(needle)).unwrap()
    };

    let search = position("SEARCH,alice", 0);
    let found = position("FOUND,1031422857,alice,100", search);
    assert!(position("READ LOCK ACQUIRED", search) < found);
    assert!(found < position("READ LOCK RELEASED", search));

    let delete = position("DELETE,bob", 0);
    let missing = position("NOT FOUND,bob", delete);
    assert!(position("WRITE LOCK ACQUIRED", delete) < missing);
    assert!(missing < position("WRITE LOCK RELEASED", delete));

    let print = position("PRINT", 0);
    let listing = print + lines[print..].iter().position(|l| *l == "1031422857,alice,100").unwrap();
    assert!(position("READ LOCK ACQUIRED", print) < listing);
    assert!(listing < position("READ LOCK RELEASED", print));
  }
}
