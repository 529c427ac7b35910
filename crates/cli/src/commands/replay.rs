//! Journal replay

use std::path::Path;

use anyhow::{Context, Result};
use ductwork::{CancellationToken, Config, Daemon};
use ductwork_journal::Journal;
use tracing::{info, warn};

/// Print every row of a journal written by `ductwork run --journal`.
pub async fn cmd_replay(config: &Config, path: &Path) -> Result<()> {
  if !path.exists() {
    anyhow::bail!("Journal not found: {}", path.display());
  }
  let journal = Journal::open(path).await.context("Failed to open journal")?;

  let mut replay = journal.replay_daemon::<u64>();
  config.apply(&mut replay);

  let cancel = CancellationToken::new();
  let instance = replay.run(&cancel).await.context("Failed to start replay")?;

  let mut rows = 0usize;
  loop {
    tokio::select! {
        biased;
        Some(err) = instance.errors().recv(&cancel) => warn!(error = %err, "Replay error"),
        value = instance.output().recv(&cancel) => match value {
            Some(value) => {
              println!("{value}");
              rows += 1;
            }
            None => break,
        },
    }
  }
  instance.wait().await;

  info!(rows, path = %path.display(), "Replay finished");
  Ok(())
}
