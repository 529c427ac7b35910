//! ductwork CLI - run demo actor/daemon pipelines

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ductwork::Config;

mod commands;
mod logging;

use commands::{cmd_config, cmd_replay, cmd_run};
use logging::init_logging;

#[derive(Parser)]
#[command(name = "ductwork")]
#[command(about = "Composable actor/daemon pipelines")]
#[command(after_help = "\
EXAMPLES:
  ductwork run -n 100 -w 4                  # Generate, increment on 4 workers, print
  ductwork run -n 10 --journal out.jsonl    # Also record every output
  ductwork replay out.jsonl                 # Print recorded outputs
  ductwork config                           # Show effective config")]
struct Cli {
  /// Config file (default: $DUCTWORK_CONFIG, then ./ductwork.toml)
  #[arg(long, global = true, value_name = "FILE")]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run generator → cluster → [journal] → stdout
  Run {
    /// Number of values to generate
    #[arg(short = 'n', long, default_value = "10")]
    count: u64,
    /// Worker count (default: [cluster] workers)
    #[arg(short, long)]
    workers: Option<usize>,
    /// Record outputs to this journal file
    #[arg(long, value_name = "FILE")]
    journal: Option<PathBuf>,
  },
  /// Print the rows of a journal
  Replay {
    /// Journal file
    journal: PathBuf,
  },
  /// Print the effective configuration as TOML
  Config,
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  let config = Config::load_or_default(cli.config.as_deref());
  let _guard = init_logging(&config.logging);

  match cli.command {
    Commands::Run {
      count,
      workers,
      journal,
    } => cmd_run(&config, count, workers, journal.as_deref()).await,
    Commands::Replay { journal } => cmd_replay(&config, &journal).await,
    Commands::Config => cmd_config(&config),
  }
}
