//! Actor → Daemon bridging.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
  Message,
  actor::Actor,
  channel::{Channel, DEFAULT_CHANNEL_CAPACITY, ErrorChannel},
  daemon::{Body, Daemon, Instance, InstanceState, join_parts, launch_part, report_error},
  error::{PipelineError, SendError},
};

/// Calls `from` for every inbound message and feeds non-empty results to the `to` daemon.
///
/// The connector is a [`Daemon`] whose input is its own and whose output is `to`'s. A failing
/// `from` call ends the bridge with [`PipelineError::Upstream`]; an `Ok(None)` ends it quietly.
///
/// It is also an [`Actor`]: `call` launches a private instance on first use, pushes the input
/// through and returns the first output or error to appear. The instance runs under a scope the
/// connector owns, so a caller's cancellation never ends it, and a fresh one replaces it once it
/// has failed or finished. Calls on one connector are
/// serialised, which keeps answers paired with their requests only while every input yields
/// exactly one output or error. A downstream that drops, splits or reorders messages hands
/// callers each other's answers. Treat the façade as a convenience for tests and simple
/// pipelines, not as request/response correlation.
pub struct ActorDaemonConnector<A, I, M, O> {
  from: A,
  to: Box<dyn Daemon<M, O>>,
  input: Option<Channel<I>>,
  errors: Option<ErrorChannel>,
  owns_link: bool,
  capacity: usize,
  facade: Arc<Facade<I, O>>,
}

struct Facade<I, O> {
  cancel: CancellationToken,
  instance: Mutex<Option<Instance<I, O>>>,
}

impl<I, O> Default for Facade<I, O> {
  fn default() -> Self {
    Self {
      cancel: CancellationToken::new(),
      instance: Mutex::new(None),
    }
  }
}

impl<I, O> Drop for Facade<I, O> {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

/// Stop the façade instance and forget it; the next call starts a fresh one.
fn retire<I: Message, O: Message>(slot: &mut Option<Instance<I, O>>) {
  if let Some(instance) = slot.take() {
    trace!(daemon = instance.name(), "Retiring façade instance");
    instance.stop();
  }
}

impl<A, I, M, O> ActorDaemonConnector<A, I, M, O>
where
  A: Actor<I, M> + Clone,
  I: Message,
  M: Message,
  O: Message,
{
  pub fn new(from: A, to: &(impl Daemon<M, O> + ?Sized)) -> Self {
    Self {
      from,
      to: to.clone_daemon(),
      input: None,
      errors: None,
      owns_link: false,
      capacity: DEFAULT_CHANNEL_CAPACITY,
      facade: Arc::default(),
    }
  }

  /// Stop the instance started by [`Actor::call`], if any. Later calls return `Ok(None)`.
  pub fn shutdown(&self) {
    self.facade.cancel.cancel();
  }
}

impl<A, I, M, O> Clone for ActorDaemonConnector<A, I, M, O>
where
  A: Clone,
  I: Message,
  M: Message,
  O: Message,
{
  fn clone(&self) -> Self {
    Self {
      from: self.from.clone(),
      to: self.to.clone_daemon(),
      input: self.input.clone(),
      errors: self.errors.clone(),
      owns_link: self.owns_link,
      capacity: self.capacity,
      facade: Arc::default(),
    }
  }
}

#[async_trait]
impl<A, I, M, O> Daemon<I, O> for ActorDaemonConnector<A, I, M, O>
where
  A: Actor<I, M> + Clone,
  I: Message,
  M: Message,
  O: Message,
{
  fn name(&self) -> &'static str {
    "actor-daemon-connector"
  }

  fn input(&self) -> Option<Channel<I>> {
    self.input.clone()
  }

  fn output(&self) -> Option<Channel<O>> {
    self.to.output()
  }

  fn errors(&self) -> Option<ErrorChannel> {
    self.errors.clone()
  }

  fn set_input(&mut self, channel: Channel<I>) {
    self.input = Some(channel);
  }

  fn set_output(&mut self, channel: Channel<O>) {
    self.to.set_output(channel);
  }

  fn set_errors(&mut self, channel: ErrorChannel) {
    self.to.set_errors(channel.clone());
    self.errors = Some(channel);
  }

  fn disable_close_channels_on_stop(&mut self, disabled: bool) {
    self.to.disable_close_channels_on_stop(disabled);
  }

  fn closes_channels_on_stop(&self) -> bool {
    self.to.closes_channels_on_stop()
  }

  fn set_channel_capacity(&mut self, capacity: usize) {
    self.capacity = capacity;
    self.to.set_channel_capacity(capacity);
  }

  fn clone_daemon(&self) -> Box<dyn Daemon<I, O>> {
    Box::new(self.clone())
  }

  fn wire(&mut self) -> Result<(), PipelineError> {
    let capacity = self.capacity;
    self.input.get_or_insert_with(|| Channel::new(capacity));
    if self.to.input().is_none() {
      self.to.set_input(Channel::new(capacity));
      self.owns_link = true;
    }

    let errors = self.errors.get_or_insert_with(|| Channel::new(capacity)).clone();
    self.to.set_errors(errors);
    self.to.wire()
  }

  async fn start(&self, cancel: CancellationToken) -> Result<Body, PipelineError> {
    let unwired = |slot: &str| PipelineError::InvalidComposition(format!("{}: {slot} channel is not wired", self.name()));
    let input = self.input.clone().ok_or_else(|| unwired("input"))?;
    let errors = self.errors.clone().ok_or_else(|| unwired("error"))?;

    let to = launch_part(&*self.to, &cancel).await?;
    let link = to.input().clone();
    let downstream = vec![to.handle()];
    let owns_link = self.owns_link;
    let from = self.from.clone();
    debug!(to = to.name(), owns_link, "Actor bridged into daemon");

    Ok(Box::pin(async move {
      if let Err(err) = bridge(&from, &cancel, &input, &link).await {
        warn!(error = %err, "Actor bridge failed");
        report_error(&errors, &cancel, err).await;
      }
      if owns_link {
        link.close();
      }
      join_parts(&cancel, &downstream).await;
      Ok(())
    }))
  }
}

async fn bridge<A, I, M>(
  from: &A,
  cancel: &CancellationToken,
  input: &Channel<I>,
  link: &Channel<M>,
) -> Result<(), PipelineError>
where
  A: Actor<I, M>,
  I: Message,
  M: Message,
{
  while let Some(msg) = input.recv(cancel).await {
    match from.call(cancel, msg).await {
      Ok(Some(out)) => {
        if let Err(reason) = link.send(cancel, out).await {
          trace!(%reason, "Bridge downstream unavailable");
          return Ok(());
        }
      }
      Ok(None) => return Ok(()),
      Err(err) if err.is_cancelled() => return Ok(()),
      Err(err) => return Err(PipelineError::upstream("from", err)),
    }
  }
  Ok(())
}

#[async_trait]
impl<A, I, M, O> Actor<I, O> for ActorDaemonConnector<A, I, M, O>
where
  A: Actor<I, M> + Clone,
  I: Message,
  M: Message,
  O: Message,
{
  async fn call(&self, cancel: &CancellationToken, input: I) -> Result<Option<O>, PipelineError> {
    let mut slot = self.facade.instance.lock().await;
    let instance = match slot.as_ref() {
      Some(instance) if instance.state() == InstanceState::Running => instance.clone(),
      _ => {
        if self.facade.cancel.is_cancelled() {
          return Ok(None);
        }
        let fresh = self.run(&self.facade.cancel).await?;
        debug!(daemon = fresh.name(), "Façade instance started");
        *slot = Some(fresh.clone());
        fresh
      }
    };

    match instance.input().send(cancel, input).await {
      Ok(()) => {}
      Err(SendError::Cancelled) => return Ok(None),
      Err(SendError::Closed) => {
        retire(&mut *slot);
        return Err(PipelineError::ChannelClosed);
      }
    }

    let answer = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        Some(err) = instance.errors().recv(cancel) => Some(Err(err)),
        out = instance.output().recv(cancel) => Some(Ok(out)),
    };

    match answer {
      Some(Ok(Some(out))) => Ok(Some(out)),
      Some(Ok(None)) if !cancel.is_cancelled() => {
        retire(&mut *slot);
        Err(PipelineError::ChannelClosed)
      }
      Some(Err(err)) => {
        // A failing `from` ends the bridge.
        if matches!(err, PipelineError::Upstream { stage: "from", .. }) {
          retire(&mut *slot);
        }
        Err(err)
      }
      // The answer may still arrive; it must not reach the next caller.
      _ => {
        retire(&mut *slot);
        Ok(None)
      }
    }
  }
}
