//! Actor → Daemon adapter.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::Actor;
use crate::{
  Message,
  daemon::{Body, Daemon, Io, Wiring, wiring_methods},
  error::PipelineError,
};

/// Runs an actor once per inbound message.
///
/// Stops when the input closes, the scope is cancelled, or the actor returns `Ok(None)`. The
/// last case is the terminator pattern for sinks. Actor errors are reported on the error channel
/// and the loop keeps going.
pub struct ActorDaemon<A, I, O> {
  actor: A,
  wiring: Wiring<I, O>,
}

impl<A: Clone, I, O> Clone for ActorDaemon<A, I, O> {
  fn clone(&self) -> Self {
    Self {
      actor: self.actor.clone(),
      wiring: self.wiring.clone(),
    }
  }
}

impl<A, I: Message, O: Message> ActorDaemon<A, I, O>
where
  A: Actor<I, O> + Clone,
{
  pub fn new(actor: A) -> Self {
    Self {
      actor,
      wiring: Wiring::default(),
    }
  }
}

#[async_trait]
impl<A, I: Message, O: Message> Daemon<I, O> for ActorDaemon<A, I, O>
where
  A: Actor<I, O> + Clone,
{
  wiring_methods!();

  fn name(&self) -> &'static str {
    "actor-daemon"
  }

  fn set_channel_capacity(&mut self, capacity: usize) {
    self.wiring.capacity = capacity;
  }

  fn clone_daemon(&self) -> Box<dyn Daemon<I, O>> {
    Box::new(self.clone())
  }

  fn wire(&mut self) -> Result<(), PipelineError> {
    self.wiring.wire();
    Ok(())
  }

  async fn start(&self, cancel: CancellationToken) -> Result<Body, PipelineError> {
    let io = self.wiring.io(self.name())?;
    let actor = self.actor.clone();
    Ok(Box::pin(async move { serve(&actor, &cancel, &io).await }))
  }
}

async fn serve<A, I, O>(actor: &A, cancel: &CancellationToken, io: &Io<I, O>) -> Result<(), PipelineError>
where
  A: Actor<I, O>,
  I: Message,
  O: Message,
{
  while let Some(input) = io.recv(cancel).await {
    match actor.call(cancel, input).await {
      Ok(Some(output)) => {
        if let Err(reason) = io.send(cancel, output).await {
          trace!(%reason, "Actor daemon output unavailable");
          return Ok(());
        }
      }
      Ok(None) => {
        trace!("Actor returned no output, terminating");
        return Ok(());
      }
      Err(err) if err.is_cancelled() => return Ok(()),
      Err(err) => io.report(cancel, err).await,
    }
  }
  Ok(())
}
