//! Daemon → Daemon chaining.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
  Message,
  channel::{Channel, DEFAULT_CHANNEL_CAPACITY, ErrorChannel},
  daemon::{Body, Daemon, join_parts, launch_part},
  error::PipelineError,
};

/// Pipes `from`'s output into `to`'s input.
///
/// Both operands are cloned at construction so the same template can appear in several
/// connectors. Either side may be an already running [`Instance`](crate::Instance); it is then
/// joined rather than launched again.
pub struct DaemonsConnector<I, M, O> {
  from: Box<dyn Daemon<I, M>>,
  to: Box<dyn Daemon<M, O>>,
  errors: Option<ErrorChannel>,
  capacity: usize,
}

impl<I: Message, M: Message, O: Message> DaemonsConnector<I, M, O> {
  pub fn new(from: &(impl Daemon<I, M> + ?Sized), to: &(impl Daemon<M, O> + ?Sized)) -> Self {
    Self {
      from: from.clone_daemon(),
      to: to.clone_daemon(),
      errors: None,
      capacity: DEFAULT_CHANNEL_CAPACITY,
    }
  }
}

impl<I: Message, M: Message, O: Message> Clone for DaemonsConnector<I, M, O> {
  fn clone(&self) -> Self {
    Self {
      from: self.from.clone_daemon(),
      to: self.to.clone_daemon(),
      errors: self.errors.clone(),
      capacity: self.capacity,
    }
  }
}

#[async_trait]
impl<I: Message, M: Message, O: Message> Daemon<I, O> for DaemonsConnector<I, M, O> {
  fn name(&self) -> &'static str {
    "daemons-connector"
  }

  fn input(&self) -> Option<Channel<I>> {
    self.from.input()
  }

  fn output(&self) -> Option<Channel<O>> {
    self.to.output()
  }

  fn errors(&self) -> Option<ErrorChannel> {
    self.errors.clone()
  }

  fn set_input(&mut self, channel: Channel<I>) {
    self.from.set_input(channel);
  }

  fn set_output(&mut self, channel: Channel<O>) {
    self.to.set_output(channel);
  }

  fn set_errors(&mut self, channel: ErrorChannel) {
    self.from.set_errors(channel.clone());
    self.to.set_errors(channel.clone());
    self.errors = Some(channel);
  }

  fn disable_close_channels_on_stop(&mut self, disabled: bool) {
    self.to.disable_close_channels_on_stop(disabled);
    // A running `to` means `from` writes into an input other daemons may share.
    if self.to.is_launched() {
      self.from.disable_close_channels_on_stop(disabled);
    }
  }

  fn closes_channels_on_stop(&self) -> bool {
    self.to.closes_channels_on_stop()
  }

  fn set_channel_capacity(&mut self, capacity: usize) {
    self.capacity = capacity;
    self.from.set_channel_capacity(capacity);
    self.to.set_channel_capacity(capacity);
  }

  fn is_launched(&self) -> bool {
    self.from.is_launched() && self.to.is_launched()
  }

  fn clone_daemon(&self) -> Box<dyn Daemon<I, O>> {
    Box::new(self.clone())
  }

  fn wire(&mut self) -> Result<(), PipelineError> {
    let link = match (self.from.output(), self.to.input()) {
      (Some(link), _) => link,
      (None, Some(link)) => link,
      (None, None) => Channel::new(self.capacity),
    };
    self.from.set_output(link.clone());
    self.to.set_input(link);

    let capacity = self.capacity;
    let errors = self.errors.get_or_insert_with(|| Channel::new(capacity)).clone();
    self.from.set_errors(errors.clone());
    self.to.set_errors(errors);

    self.from.wire()?;
    self.to.wire()
  }

  async fn start(&self, cancel: CancellationToken) -> Result<Body, PipelineError> {
    let from = launch_part(&*self.from, &cancel).await?;
    let to = match launch_part(&*self.to, &cancel).await {
      Ok(to) => to,
      Err(err) => {
        from.stop();
        return Err(err);
      }
    };
    debug!(from = from.name(), to = to.name(), "Daemons connected");

    let parts = vec![from.handle(), to.handle()];
    Ok(Box::pin(async move {
      join_parts(&cancel, &parts).await;
      Ok(())
    }))
  }
}
