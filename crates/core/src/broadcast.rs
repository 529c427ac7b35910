//! Fan-out of one input stream to several daemon pipelines.
//!
//! Unlike a [`Cluster`](crate::Cluster), every member sees every message. Each inbound message
//! is offered to all members at once and the broadcast waits until every member has accepted
//! it before reading the next one, so a slow member throttles the whole group.

use async_trait::async_trait;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
  Message,
  channel::Channel,
  daemon::{Body, Daemon, Handle, Wiring, join_parts, launch_part, wiring_methods},
  error::{PipelineError, SendError},
};

/// Replicates its input to every member's input.
///
/// Members usually write into one shared sink, so their close-on-stop is disabled when they are
/// added. Members without an input get a private one that the broadcast closes when its own
/// input ends. When the broadcast has no output of its own it adopts the first member's and
/// leaves closing it to that channel's owner.
pub struct Broadcast<I, O> {
  members: Vec<Box<dyn Daemon<I, O>>>,
  owned_inputs: Vec<bool>,
  wiring: Wiring<I, O>,
}

impl<I: Message + Clone, O: Message> Broadcast<I, O> {
  pub fn new(members: impl IntoIterator<Item = Box<dyn Daemon<I, O>>>) -> Self {
    let mut broadcast = Self {
      members: Vec::new(),
      owned_inputs: Vec::new(),
      wiring: Wiring::default(),
    };
    for member in members {
      broadcast.push_member(member);
    }
    broadcast
  }

  /// Add a member. It is cloned.
  pub fn with_member(mut self, member: &(impl Daemon<I, O> + ?Sized)) -> Self {
    self.push_member(member.clone_daemon());
    self
  }

  fn push_member(&mut self, mut member: Box<dyn Daemon<I, O>>) {
    member.disable_close_channels_on_stop(true);
    self.members.push(member);
    self.owned_inputs.push(false);
  }

  pub fn len(&self) -> usize {
    self.members.len()
  }

  pub fn is_empty(&self) -> bool {
    self.members.is_empty()
  }
}

impl<I: Message, O: Message> Clone for Broadcast<I, O> {
  fn clone(&self) -> Self {
    Self {
      members: self.members.iter().map(|member| member.clone_daemon()).collect(),
      owned_inputs: self.owned_inputs.clone(),
      wiring: self.wiring.clone(),
    }
  }
}

#[async_trait]
impl<I: Message + Clone, O: Message> Daemon<I, O> for Broadcast<I, O> {
  wiring_methods!();

  fn name(&self) -> &'static str {
    "broadcast"
  }

  fn set_channel_capacity(&mut self, capacity: usize) {
    self.wiring.capacity = capacity;
    for member in &mut self.members {
      member.set_channel_capacity(capacity);
    }
  }

  fn clone_daemon(&self) -> Box<dyn Daemon<I, O>> {
    Box::new(self.clone())
  }

  fn wire(&mut self) -> Result<(), PipelineError> {
    let capacity = self.wiring.capacity;
    if self.wiring.output.is_none() {
      self.wiring.output = self.members.iter().find_map(|member| member.output());
      // An adopted output belongs to whoever allocated it.
      if self.wiring.output.is_some() {
        self.wiring.close_on_stop = false;
      }
    }
    self.wiring.wire();
    let io = self.wiring.io("broadcast")?;

    for (member, owned) in self.members.iter_mut().zip(self.owned_inputs.iter_mut()) {
      if member.input().is_none() {
        member.set_input(Channel::new(capacity));
        *owned = true;
      }
      if member.output().is_none() {
        member.set_output(io.output.clone());
      }
      member.set_errors(io.errors.clone());
      member.wire()?;
    }
    Ok(())
  }

  async fn start(&self, cancel: CancellationToken) -> Result<Body, PipelineError> {
    if self.members.is_empty() {
      return Err(PipelineError::InvalidComposition("broadcast needs at least one member".into()));
    }
    let io = self.wiring.io(self.name())?;

    let mut lanes = Vec::with_capacity(self.members.len());
    let mut handles: Vec<Handle> = Vec::with_capacity(self.members.len());
    for (member, &owned) in self.members.iter().zip(&self.owned_inputs) {
      let instance = launch_part(&**member, &cancel).await?;
      lanes.push((instance.input().clone(), owned));
      handles.push(instance.handle());
    }
    debug!(members = handles.len(), "Broadcast running");

    Ok(Box::pin(async move {
      let mut replicated = 0usize;
      while let Some(msg) = io.input.recv(&cancel).await {
        let deliveries = join_all(lanes.iter().map(|(lane, _)| lane.send(&cancel, msg.clone()))).await;
        if deliveries.contains(&Err(SendError::Cancelled)) {
          break;
        }
        replicated += 1;
        trace!(replicated, "Broadcast message delivered");
      }

      if !cancel.is_cancelled() {
        for (lane, owned) in &lanes {
          if *owned {
            lane.close();
          }
        }
      }
      join_parts(&cancel, &handles).await;
      Ok(())
    }))
  }
}
