use std::fs::File;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chashdb::Engine;
use chashdb::config::{Config, LogConfig};
use chashdb::journal::Journal;
use chashdb::protocol;

/// Run a batch of record store commands, one task per command
#[derive(Debug, Parser)]
#[command(name = "chashdb", version)]
struct Args {
  /// TOML config file
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Command file (overrides the config)
  #[arg(short, long)]
  input: Option<PathBuf>,

  /// Journal output file (overrides the config)
  #[arg(short, long)]
  output: Option<PathBuf>,

  /// Most command tasks running at once (overrides the config)
  #[arg(long)]
  max_concurrency: Option<usize>,
}

fn main() -> anyhow::Result<()> {
  let args = Args::parse();
  let config = load_config(args)?;

  init_logging(&config.log)?;
  info!("Starting chashdb - concurrent record store");
  info!("Version: {}", env!("CARGO_PKG_VERSION"));

  let mut builder = tokio::runtime::Builder::new_multi_thread();
  builder.enable_all();
  if let Some(threads) = config.blocking_threads {
    builder.max_blocking_threads(threads);
  }
  let runtime = builder.build().context("Failed to build tokio runtime")?;

  runtime.block_on(run(config))
}

fn load_config(args: Args) -> anyhow::Result<Config> {
  let mut config = match &args.config {
    Some(path) => Config::from_file(path)?,
    None => Config::default(),
  };

  if let Some(input) = args.input {
    config.input = input;
  }
  if let Some(output) = args.output {
    config.output = output;
  }
  if args.max_concurrency.is_some() {
    config.max_concurrency = args.max_concurrency;
  }

  config.validate()?;
  Ok(config)
}

fn init_logging(log: &LogConfig) -> anyhow::Result<()> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(true)
    .with_thread_ids(true);

  match &log.file {
    Some(path) => {
      let file = File::create(path)
        .with_context(|| format!("Failed to open log file '{}'", path.display()))?;
      builder.with_ansi(false).with_writer(Mutex::new(file)).init();
    }
    None => builder.init(),
  }
  Ok(())
}

async fn run(config: Config) -> anyhow::Result<()> {
  // Both files are opened before any command task exists.
  let journal = Arc::new(Journal::create(&config.output, config.timestamp)?);
  let batch = protocol::Parser::parse_file(&config.input)?;

  let report = Engine::new(journal)
    .with_max_concurrency(config.max_concurrency)
    .run(batch)
    .await?;

  info!(
    "Wrote {} records to {}",
    report.records.len(),
    config.output.display()
  );
  Ok(())
}
