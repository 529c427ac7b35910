//! Demo pipeline
//!
//! ```text
//! generator(1..=N) ──▶ Cluster(W × plus-one) ──▶ [journal] ──▶ stdout
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use ductwork::{ActorExt, CancellationToken, Cluster, Config, Daemon, DaemonExt, FnDaemon, actor_fn};
use ductwork_journal::Journal;
use tracing::{debug, error, info, warn};

/// Emits `1..=count` and finishes.
fn generator(count: u64) -> FnDaemon<(), u64> {
  FnDaemon::new(move |cancel, io| async move {
    for n in 1..=count {
      io.send(&cancel, n).await?;
    }
    Ok(())
  })
  .named("generator")
}

pub async fn cmd_run(config: &Config, count: u64, workers: Option<usize>, journal: Option<&Path>) -> Result<()> {
  let workers = workers.unwrap_or(config.cluster.workers);
  let plus_one = actor_fn(|_, n: u64| Ok(Some(n + 1))).as_daemon();
  let pool = Cluster::new(workers, &plus_one);

  let mut pipeline: Box<dyn Daemon<(), u64>> = Box::new(generator(count).connect_daemon(&pool));
  if let Some(path) = journal {
    let journal = Journal::open(path).await.context("Failed to open journal")?;
    debug!(path = %path.display(), last_row = journal.last_row().await, "Recording outputs");
    pipeline = Box::new(pipeline.connect_actor(&journal.actor::<u64>()));
  }
  config.apply(&mut pipeline);

  let cancel = CancellationToken::new();
  let instance = pipeline.run(&cancel).await.context("Failed to start pipeline")?;
  info!(count, workers, "Pipeline running");

  let ctrl_c = tokio::signal::ctrl_c();
  tokio::pin!(ctrl_c);

  let mut received = 0u64;
  let mut max = None;
  let mut failures = 0usize;
  loop {
    tokio::select! {
        biased;
        _ = &mut ctrl_c => {
            warn!("Interrupted, stopping pipeline");
            instance.stop();
            break;
        }
        Some(err) = instance.errors().recv(&cancel) => {
            error!(error = %err, "Pipeline error");
            failures += 1;
        }
        value = instance.output().recv(&cancel) => match value {
            Some(value) => {
              println!("{value}");
              received += 1;
              max = max.max(Some(value));
            }
            None => break,
        },
    }
  }
  instance.wait().await;

  info!(received, max = ?max, failures, "Pipeline finished");
  if failures > 0 {
    anyhow::bail!("{failures} pipeline error(s)");
  }
  Ok(())
}
