//! Daemon → Actor bridging.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
  Message,
  actor::Actor,
  channel::{Channel, DEFAULT_CHANNEL_CAPACITY, ErrorChannel},
  daemon::{Body, Daemon, join_parts, launch_part, report_error},
  error::PipelineError,
};

/// Calls the `to` actor on everything the `from` daemon emits.
///
/// Input passes straight through to `from`; results land on the connector's own output. Empty
/// results are skipped. A failing `to` call ends the connector with
/// [`PipelineError::Upstream`]. Whenever forwarding ends, `from` is stopped unless it already
/// finished.
pub struct DaemonActorConnector<I, M, O, A> {
  from: Box<dyn Daemon<I, M>>,
  to: A,
  output: Option<Channel<O>>,
  errors: Option<ErrorChannel>,
  close_on_stop: bool,
  capacity: usize,
}

impl<I, M, O, A> DaemonActorConnector<I, M, O, A>
where
  I: Message,
  M: Message,
  O: Message,
  A: Actor<M, O> + Clone,
{
  pub fn new(from: &(impl Daemon<I, M> + ?Sized), to: &A) -> Self {
    Self {
      from: from.clone_daemon(),
      to: to.clone(),
      output: None,
      errors: None,
      close_on_stop: true,
      capacity: DEFAULT_CHANNEL_CAPACITY,
    }
  }
}

impl<I, M, O, A> Clone for DaemonActorConnector<I, M, O, A>
where
  I: Message,
  M: Message,
  A: Clone,
{
  fn clone(&self) -> Self {
    Self {
      from: self.from.clone_daemon(),
      to: self.to.clone(),
      output: self.output.clone(),
      errors: self.errors.clone(),
      close_on_stop: self.close_on_stop,
      capacity: self.capacity,
    }
  }
}

#[async_trait]
impl<I, M, O, A> Daemon<I, O> for DaemonActorConnector<I, M, O, A>
where
  I: Message,
  M: Message,
  O: Message,
  A: Actor<M, O> + Clone,
{
  fn name(&self) -> &'static str {
    "daemon-actor-connector"
  }

  fn input(&self) -> Option<Channel<I>> {
    self.from.input()
  }

  fn output(&self) -> Option<Channel<O>> {
    self.output.clone()
  }

  fn errors(&self) -> Option<ErrorChannel> {
    self.errors.clone()
  }

  fn set_input(&mut self, channel: Channel<I>) {
    self.from.set_input(channel);
  }

  fn set_output(&mut self, channel: Channel<O>) {
    self.output = Some(channel);
  }

  fn set_errors(&mut self, channel: ErrorChannel) {
    self.from.set_errors(channel.clone());
    self.errors = Some(channel);
  }

  fn disable_close_channels_on_stop(&mut self, disabled: bool) {
    self.close_on_stop = !disabled;
  }

  fn closes_channels_on_stop(&self) -> bool {
    self.close_on_stop
  }

  fn set_channel_capacity(&mut self, capacity: usize) {
    self.capacity = capacity;
    self.from.set_channel_capacity(capacity);
  }

  fn clone_daemon(&self) -> Box<dyn Daemon<I, O>> {
    Box::new(self.clone())
  }

  fn wire(&mut self) -> Result<(), PipelineError> {
    let capacity = self.capacity;
    self.output.get_or_insert_with(|| Channel::new(capacity));
    let errors = self.errors.get_or_insert_with(|| Channel::new(capacity)).clone();
    self.from.set_errors(errors);
    self.from.wire()
  }

  async fn start(&self, cancel: CancellationToken) -> Result<Body, PipelineError> {
    let unwired = |slot: &str| PipelineError::InvalidComposition(format!("{}: {slot} channel is not wired", self.name()));
    let output = self.output.clone().ok_or_else(|| unwired("output"))?;
    let errors = self.errors.clone().ok_or_else(|| unwired("error"))?;

    let from = launch_part(&*self.from, &cancel).await?;
    let upstream = from.output().clone();
    let handles = vec![from.handle()];
    let to = self.to.clone();
    debug!(from = from.name(), "Daemon bridged into actor");

    Ok(Box::pin(async move {
      let result = forward(&to, &cancel, &upstream, &output).await;
      // Nothing reads the upstream any more; stop is a no-op once it has finished.
      for handle in &handles {
        handle.stop();
      }
      if let Err(err) = result {
        warn!(error = %err, "Daemon-actor bridge failed");
        report_error(&errors, &cancel, err).await;
      }
      join_parts(&cancel, &handles).await;
      Ok(())
    }))
  }
}

async fn forward<A, M, O>(
  to: &A,
  cancel: &CancellationToken,
  upstream: &Channel<M>,
  output: &Channel<O>,
) -> Result<(), PipelineError>
where
  A: Actor<M, O>,
  M: Message,
  O: Message,
{
  while let Some(msg) = upstream.recv(cancel).await {
    match to.call(cancel, msg).await {
      Ok(Some(out)) => {
        if let Err(reason) = output.send(cancel, out).await {
          trace!(%reason, "Bridge output unavailable");
          return Ok(());
        }
      }
      Ok(None) => {}
      Err(err) if err.is_cancelled() => return Ok(()),
      Err(err) => return Err(PipelineError::upstream("to", err)),
    }
  }
  Ok(())
}
