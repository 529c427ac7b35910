//! Daemons: long-running streaming processes.
//!
//! A [`Daemon`] value is a *template*: a transform plus optional channel handles and a
//! close-on-stop flag. Templates are cheap to clone and never run themselves. [`Daemon::run`]
//! clones the template into an [`Instance`], allocates any missing channels and spawns the
//! transform on its own task under a child of the caller's cancellation token.
//!
//! ```text
//!            ┌──────────── Instance ────────────┐
//!  input ──▶ │ transform(cancel, Io{in,out,err}) │ ──▶ output
//!            └──────────────┬───────────────────┘
//!                           └──▶ errors
//! ```
//!
//! When the transform exits the output channel is closed, which signals end-of-stream to the
//! next stage. Daemons that share an output with siblings must disable this with
//! [`Daemon::disable_close_channels_on_stop`].

mod instance;

use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::trace;

pub use self::instance::{Handle, Instance, InstanceState};
pub(crate) use self::instance::{join_parts, launch_part, report_error};
use crate::{
  Message,
  actor::Actor,
  channel::{Channel, DEFAULT_CHANNEL_CAPACITY, ErrorChannel},
  connector::{DaemonActorConnector, DaemonsConnector},
  error::{PipelineError, SendError},
};

/// Future driving one launched daemon to completion.
pub type Body = BoxFuture<'static, Result<(), PipelineError>>;

// ============================================================================
// Template contract
// ============================================================================

/// An unlaunched streaming process from `I` to `O`.
#[async_trait]
pub trait Daemon<I: Message, O: Message>: Send + Sync + 'static {
  /// Short name used in logs and errors.
  fn name(&self) -> &'static str;

  fn input(&self) -> Option<Channel<I>>;
  fn output(&self) -> Option<Channel<O>>;
  fn errors(&self) -> Option<ErrorChannel>;

  fn set_input(&mut self, channel: Channel<I>);
  fn set_output(&mut self, channel: Channel<O>);
  fn set_errors(&mut self, channel: ErrorChannel);

  /// Keep the output open when the transform exits.
  fn disable_close_channels_on_stop(&mut self, disabled: bool);
  fn closes_channels_on_stop(&self) -> bool;

  /// Capacity for channels allocated by [`Daemon::wire`].
  fn set_channel_capacity(&mut self, capacity: usize);

  /// Templates are never launched; running instances and connectors of them may be.
  fn is_launched(&self) -> bool {
    false
  }

  /// Shallow copy. Channel handles are shared, run state is not.
  fn clone_daemon(&self) -> Box<dyn Daemon<I, O>>;

  /// Allocate every channel that has not been assigned yet, recursively.
  fn wire(&mut self) -> Result<(), PipelineError>;

  /// The running instance behind this value, when it is one.
  fn as_instance(&self) -> Option<Instance<I, O>> {
    None
  }

  /// Launch owned parts under `cancel` and return the body to run on the instance task.
  ///
  /// Called by [`Instance::launch`] on a wired template.
  async fn start(&self, cancel: CancellationToken) -> Result<Body, PipelineError>;

  /// Clone, wire and launch. Returns once the instance is registered as running.
  async fn run(&self, cancel: &CancellationToken) -> Result<Instance<I, O>, PipelineError> {
    let instance = Instance::new(self.clone_daemon())?;
    instance.launch(cancel).await?;
    Ok(instance)
  }

  /// Force-close input and output. Meant for a sole owner shutting the daemon down.
  fn close(&self) {
    if let Some(input) = self.input() {
      input.close();
    }
    if let Some(output) = self.output() {
      output.close();
    }
  }
}

#[async_trait]
impl<I: Message, O: Message> Daemon<I, O> for Box<dyn Daemon<I, O>> {
  fn name(&self) -> &'static str {
    (**self).name()
  }

  fn input(&self) -> Option<Channel<I>> {
    (**self).input()
  }

  fn output(&self) -> Option<Channel<O>> {
    (**self).output()
  }

  fn errors(&self) -> Option<ErrorChannel> {
    (**self).errors()
  }

  fn set_input(&mut self, channel: Channel<I>) {
    (**self).set_input(channel)
  }

  fn set_output(&mut self, channel: Channel<O>) {
    (**self).set_output(channel)
  }

  fn set_errors(&mut self, channel: ErrorChannel) {
    (**self).set_errors(channel)
  }

  fn disable_close_channels_on_stop(&mut self, disabled: bool) {
    (**self).disable_close_channels_on_stop(disabled)
  }

  fn closes_channels_on_stop(&self) -> bool {
    (**self).closes_channels_on_stop()
  }

  fn set_channel_capacity(&mut self, capacity: usize) {
    (**self).set_channel_capacity(capacity)
  }

  fn is_launched(&self) -> bool {
    (**self).is_launched()
  }

  fn clone_daemon(&self) -> Box<dyn Daemon<I, O>> {
    (**self).clone_daemon()
  }

  fn wire(&mut self) -> Result<(), PipelineError> {
    (**self).wire()
  }

  fn as_instance(&self) -> Option<Instance<I, O>> {
    (**self).as_instance()
  }

  async fn start(&self, cancel: CancellationToken) -> Result<Body, PipelineError> {
    (**self).start(cancel).await
  }

  async fn run(&self, cancel: &CancellationToken) -> Result<Instance<I, O>, PipelineError> {
    (**self).run(cancel).await
  }
}

// ============================================================================
// Composition
// ============================================================================

/// Composition and builder helpers available on every daemon.
pub trait DaemonExt<I: Message, O: Message>: Daemon<I, O> {
  /// Feed this daemon's output into `to`. Both sides are cloned.
  fn connect_daemon<P: Message>(&self, to: &(impl Daemon<O, P> + ?Sized)) -> DaemonsConnector<I, O, P> {
    DaemonsConnector::new(self, to)
  }

  /// Call `to` for every message this daemon produces.
  fn connect_actor<P: Message, A: Actor<O, P> + Clone>(&self, to: &A) -> DaemonActorConnector<I, O, P, A> {
    DaemonActorConnector::new(self, to)
  }

  fn with_input(mut self, channel: Channel<I>) -> Self
  where
    Self: Sized,
  {
    self.set_input(channel);
    self
  }

  fn with_output(mut self, channel: Channel<O>) -> Self
  where
    Self: Sized,
  {
    self.set_output(channel);
    self
  }

  fn with_errors(mut self, channel: ErrorChannel) -> Self
  where
    Self: Sized,
  {
    self.set_errors(channel);
    self
  }

  fn without_close_on_stop(mut self) -> Self
  where
    Self: Sized,
  {
    self.disable_close_channels_on_stop(true);
    self
  }

  fn with_channel_capacity(mut self, capacity: usize) -> Self
  where
    Self: Sized,
  {
    self.set_channel_capacity(capacity);
    self
  }
}

impl<I: Message, O: Message, D: Daemon<I, O> + ?Sized> DaemonExt<I, O> for D {}

// ============================================================================
// Wiring
// ============================================================================

/// The channels a transform reads from and writes to.
pub struct Io<I, O> {
  pub input: Channel<I>,
  pub output: Channel<O>,
  pub errors: ErrorChannel,
}

impl<I, O> Clone for Io<I, O> {
  fn clone(&self) -> Self {
    Self {
      input: self.input.clone(),
      output: self.output.clone(),
      errors: self.errors.clone(),
    }
  }
}

impl<I: Message, O: Message> Io<I, O> {
  pub async fn recv(&self, cancel: &CancellationToken) -> Option<I> {
    self.input.recv(cancel).await
  }

  pub async fn send(&self, cancel: &CancellationToken, value: O) -> Result<(), SendError> {
    self.output.send(cancel, value).await
  }

  /// Offer an error once; dropped if the scope is cancelled first.
  pub async fn report(&self, cancel: &CancellationToken, err: PipelineError) {
    report_error(&self.errors, cancel, err).await;
  }
}

/// Channel slots and flags shared by the leaf daemon types.
pub(crate) struct Wiring<I, O> {
  pub(crate) input: Option<Channel<I>>,
  pub(crate) output: Option<Channel<O>>,
  pub(crate) errors: Option<ErrorChannel>,
  pub(crate) close_on_stop: bool,
  pub(crate) capacity: usize,
}

impl<I, O> Default for Wiring<I, O> {
  fn default() -> Self {
    Self {
      input: None,
      output: None,
      errors: None,
      close_on_stop: true,
      capacity: DEFAULT_CHANNEL_CAPACITY,
    }
  }
}

impl<I, O> Clone for Wiring<I, O> {
  fn clone(&self) -> Self {
    Self {
      input: self.input.clone(),
      output: self.output.clone(),
      errors: self.errors.clone(),
      close_on_stop: self.close_on_stop,
      capacity: self.capacity,
    }
  }
}

impl<I: Message, O: Message> Wiring<I, O> {
  pub(crate) fn wire(&mut self) {
    let capacity = self.capacity;
    self.input.get_or_insert_with(|| Channel::new(capacity));
    self.output.get_or_insert_with(|| Channel::new(capacity));
    self.errors.get_or_insert_with(|| Channel::new(capacity));
  }

  pub(crate) fn io(&self, daemon: &'static str) -> Result<Io<I, O>, PipelineError> {
    let unwired = |slot: &str| PipelineError::InvalidComposition(format!("{daemon}: {slot} channel is not wired"));
    Ok(Io {
      input: self.input.clone().ok_or_else(|| unwired("input"))?,
      output: self.output.clone().ok_or_else(|| unwired("output"))?,
      errors: self.errors.clone().ok_or_else(|| unwired("error"))?,
    })
  }
}

/// Implements the channel accessors of [`Daemon`] over a `wiring: Wiring<I, O>` field.
macro_rules! wiring_methods {
  () => {
    fn input(&self) -> Option<$crate::Channel<I>> {
      self.wiring.input.clone()
    }

    fn output(&self) -> Option<$crate::Channel<O>> {
      self.wiring.output.clone()
    }

    fn errors(&self) -> Option<$crate::ErrorChannel> {
      self.wiring.errors.clone()
    }

    fn set_input(&mut self, channel: $crate::Channel<I>) {
      self.wiring.input = Some(channel);
    }

    fn set_output(&mut self, channel: $crate::Channel<O>) {
      self.wiring.output = Some(channel);
    }

    fn set_errors(&mut self, channel: $crate::ErrorChannel) {
      self.wiring.errors = Some(channel);
    }

    fn disable_close_channels_on_stop(&mut self, disabled: bool) {
      self.wiring.close_on_stop = !disabled;
    }

    fn closes_channels_on_stop(&self) -> bool {
      self.wiring.close_on_stop
    }
  };
}
pub(crate) use wiring_methods;

// ============================================================================
// Function daemon
// ============================================================================

type Transform<I, O> = Arc<dyn Fn(CancellationToken, Io<I, O>) -> Body + Send + Sync>;

/// A daemon built from an async transform over its [`Io`].
///
/// ```ignore
/// let doubler = FnDaemon::new(|cancel, io: Io<i64, i64>| async move {
///   while let Some(x) = io.recv(&cancel).await {
///     io.send(&cancel, x * 2).await?;
///   }
///   Ok(())
/// });
/// ```
pub struct FnDaemon<I, O> {
  name: &'static str,
  transform: Transform<I, O>,
  wiring: Wiring<I, O>,
}

impl<I: Message, O: Message> FnDaemon<I, O> {
  pub fn new<F, Fut>(transform: F) -> Self
  where
    F: Fn(CancellationToken, Io<I, O>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), PipelineError>> + Send + 'static,
  {
    Self {
      name: "fn-daemon",
      transform: Arc::new(move |cancel, io| Box::pin(transform(cancel, io))),
      wiring: Wiring::default(),
    }
  }

  /// Name reported in logs.
  pub fn named(mut self, name: &'static str) -> Self {
    self.name = name;
    self
  }
}

impl<I, O> Clone for FnDaemon<I, O> {
  fn clone(&self) -> Self {
    Self {
      name: self.name,
      transform: Arc::clone(&self.transform),
      wiring: self.wiring.clone(),
    }
  }
}

#[async_trait]
impl<I: Message, O: Message> Daemon<I, O> for FnDaemon<I, O> {
  wiring_methods!();

  fn name(&self) -> &'static str {
    self.name
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
    let io = self.wiring.io(self.name)?;
    trace!(daemon = self.name, "Starting transform");
    Ok((self.transform)(cancel, io))
  }
}
