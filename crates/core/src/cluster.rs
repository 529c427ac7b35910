//! Worker pools of identical daemons.
//!
//! ```text
//!                ┌─▶ worker 0 ─┐
//!  input ──(shared)─▶ worker 1 ─┼──(shared)──▶ output
//!                └─▶ worker N ─┘
//! ```
//!
//! Every worker blocks on the same input channel, so each message is taken by exactly one of
//! them. Output order across workers is not preserved.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
  Message,
  config::ClusterConfig,
  daemon::{Body, Daemon, Instance, Wiring, join_parts, wiring_methods},
  error::PipelineError,
};

/// `size` clones of one template sharing the cluster's input, output and error channels.
///
/// Workers never close the shared output; the cluster closes it after all of them exit.
pub struct Cluster<I, O> {
  size: usize,
  template: Box<dyn Daemon<I, O>>,
  wiring: Wiring<I, O>,
}

impl<I: Message, O: Message> Cluster<I, O> {
  pub fn new(size: usize, template: &(impl Daemon<I, O> + ?Sized)) -> Self {
    Self {
      size,
      template: template.clone_daemon(),
      wiring: Wiring::default(),
    }
  }

  /// A cluster sized by `[cluster] workers`.
  pub fn from_config(config: &ClusterConfig, template: &(impl Daemon<I, O> + ?Sized)) -> Self {
    Self::new(config.workers, template)
  }

  pub fn size(&self) -> usize {
    self.size
  }
}

impl<I: Message, O: Message> Clone for Cluster<I, O> {
  fn clone(&self) -> Self {
    Self {
      size: self.size,
      template: self.template.clone_daemon(),
      wiring: self.wiring.clone(),
    }
  }
}

#[async_trait]
impl<I: Message, O: Message> Daemon<I, O> for Cluster<I, O> {
  wiring_methods!();

  fn name(&self) -> &'static str {
    "cluster"
  }

  fn set_channel_capacity(&mut self, capacity: usize) {
    self.wiring.capacity = capacity;
    self.template.set_channel_capacity(capacity);
  }

  fn clone_daemon(&self) -> Box<dyn Daemon<I, O>> {
    Box::new(self.clone())
  }

  fn wire(&mut self) -> Result<(), PipelineError> {
    self.wiring.wire();
    Ok(())
  }

  async fn start(&self, cancel: CancellationToken) -> Result<Body, PipelineError> {
    if self.size == 0 {
      return Err(PipelineError::InvalidComposition("cluster needs at least one worker".into()));
    }
    let io = self.wiring.io(self.name())?;

    let mut workers = Vec::with_capacity(self.size);
    for worker_id in 0..self.size {
      let mut member = self.template.clone_daemon();
      member.set_input(io.input.clone());
      member.set_output(io.output.clone());
      member.set_errors(io.errors.clone());
      member.disable_close_channels_on_stop(true);

      let worker = Instance::new(member)?;
      worker.launch(&cancel).await?;
      debug!(worker_id, daemon = worker.name(), "Cluster worker launched");
      workers.push(worker.handle());
    }
    debug!(workers = workers.len(), "Cluster running");

    Ok(Box::pin(async move {
      join_parts(&cancel, &workers).await;
      Ok(())
    }))
  }
}
