//! Shared building blocks for pipeline tests.

use std::{future::Future, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::{
  Message,
  actor::{Actor, actor_fn},
  channel::Channel,
  daemon::FnDaemon,
  error::PipelineError,
};

/// Upper bound for any single wait in a test.
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Await `fut`, failing the test if it takes longer than [`TIMEOUT`].
pub async fn within<F: Future>(fut: F) -> F::Output {
  tokio::time::timeout(TIMEOUT, fut).await.expect("operation timed out")
}

pub fn plus_one() -> impl Actor<i64, i64> + Clone {
  actor_fn(|_, x: i64| Ok(Some(x + 1)))
}

/// Fails on negative input.
pub fn non_negative() -> impl Actor<i64, i64> + Clone {
  actor_fn(|_, x: i64| {
    if x < 0 {
      Err(PipelineError::InvalidInput(format!("negative: {x}")))
    } else {
      Ok(Some(x))
    }
  })
}

/// Emits `values` and exits without reading its input.
pub fn generator(values: Vec<i64>) -> FnDaemon<(), i64> {
  FnDaemon::new(move |cancel, io| {
    let values = values.clone();
    async move {
      for v in values {
        io.send(&cancel, v).await?;
      }
      Ok(())
    }
  })
  .named("generator")
}

/// Emits the running total of everything it has received.
pub fn running_sum() -> FnDaemon<i64, i64> {
  FnDaemon::new(|cancel, io| async move {
    let mut sum = 0;
    while let Some(x) = io.recv(&cancel).await {
      sum += x;
      io.send(&cancel, sum).await?;
    }
    Ok(())
  })
  .named("running-sum")
}

/// Receive until the channel is closed and drained.
pub async fn drain<T: Message>(channel: &Channel<T>, cancel: &CancellationToken) -> Vec<T> {
  let mut received = Vec::new();
  while let Some(v) = within(channel.recv(cancel)).await {
    received.push(v);
  }
  received
}
