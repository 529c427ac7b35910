//! Running daemon instances and their lifecycle.
//!
//! Every instance moves through `Idle → Running → Stopping → Stopped` exactly once. The state
//! lives in a single atomic; launching is a compare-and-swap out of `Idle`, so at most one task
//! ever executes a given instance.

use std::{
  any::Any,
  panic::AssertUnwindSafe,
  sync::{
    Arc, OnceLock,
    atomic::{AtomicU8, Ordering},
  },
};

use async_trait::async_trait;
use futures::{FutureExt, future::join_all};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::{Body, Daemon};
use crate::{
  Message,
  channel::{Channel, ErrorChannel},
  error::PipelineError,
};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPING: u8 = 2;
const STOPPED: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
  Idle,
  Running,
  Stopping,
  Stopped,
}

impl InstanceState {
  fn from_raw(raw: u8) -> Self {
    match raw {
      IDLE => Self::Idle,
      RUNNING => Self::Running,
      STOPPING => Self::Stopping,
      _ => Self::Stopped,
    }
  }
}

// ============================================================================
// Lifecycle control
// ============================================================================

#[derive(Debug)]
struct Control {
  daemon: &'static str,
  state: AtomicU8,
  cancel: OnceLock<CancellationToken>,
  finished: CancellationToken,
}

impl Control {
  fn new(daemon: &'static str) -> Self {
    Self {
      daemon,
      state: AtomicU8::new(IDLE),
      cancel: OnceLock::new(),
      finished: CancellationToken::new(),
    }
  }

  fn state(&self) -> InstanceState {
    InstanceState::from_raw(self.state.load(Ordering::Acquire))
  }

  fn is_launched(&self) -> bool {
    matches!(self.state(), InstanceState::Running | InstanceState::Stopping)
  }

  fn begin(&self, parent: &CancellationToken) -> Result<CancellationToken, PipelineError> {
    self
      .state
      .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
      .map_err(|_| PipelineError::AlreadyLaunched { daemon: self.daemon })?;

    let token = parent.child_token();
    let _ = self.cancel.set(token.clone());

    // A stop that landed between the swap and publishing the token.
    if self.state.load(Ordering::Acquire) == STOPPING {
      token.cancel();
    }
    Ok(token)
  }

  fn stop(&self) {
    match self
      .state
      .compare_exchange(RUNNING, STOPPING, Ordering::AcqRel, Ordering::Acquire)
    {
      Ok(_) | Err(STOPPING) => {
        debug!(daemon = self.daemon, "Stopping daemon");
        if let Some(token) = self.cancel.get() {
          token.cancel();
        }
      }
      Err(_) => {}
    }
  }

  fn finish(&self) {
    self.state.store(STOPPED, Ordering::Release);
    self.finished.cancel();
  }

  async fn wait(&self) {
    if self.state() == InstanceState::Idle {
      return;
    }
    self.finished.cancelled().await;
  }
}

/// Type-erased stop/wait handle for a launched instance.
#[derive(Debug, Clone)]
pub struct Handle {
  control: Arc<Control>,
}

impl Handle {
  pub fn name(&self) -> &'static str {
    self.control.daemon
  }

  pub fn state(&self) -> InstanceState {
    self.control.state()
  }

  pub fn is_launched(&self) -> bool {
    self.control.is_launched()
  }

  pub fn stop(&self) {
    self.control.stop();
  }

  pub async fn wait(&self) {
    self.control.wait().await;
  }
}

// ============================================================================
// Instance
// ============================================================================

/// A launched (or launchable) copy of a daemon template.
///
/// Cloning an `Instance` clones the handle; both clones observe the same execution.
pub struct Instance<I, O> {
  inner: Arc<Inner<I, O>>,
}

struct Inner<I, O> {
  template: Box<dyn Daemon<I, O>>,
  input: Channel<I>,
  output: Channel<O>,
  errors: ErrorChannel,
  control: Arc<Control>,
}

impl<I, O> Clone for Instance<I, O> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<I: Message, O: Message> Instance<I, O> {
  /// Wire `template` and wrap it in an idle instance.
  pub fn new(mut template: Box<dyn Daemon<I, O>>) -> Result<Self, PipelineError> {
    template.wire()?;
    let daemon = template.name();
    let unwired = |slot: &str| PipelineError::InvalidComposition(format!("{daemon}: {slot} channel is not wired"));

    let input = template.input().ok_or_else(|| unwired("input"))?;
    let output = template.output().ok_or_else(|| unwired("output"))?;
    let errors = template.errors().ok_or_else(|| unwired("error"))?;

    Ok(Self {
      inner: Arc::new(Inner {
        template,
        input,
        output,
        errors,
        control: Arc::new(Control::new(daemon)),
      }),
    })
  }

  /// Start the transform on its own task under a child of `cancel`.
  ///
  /// Fails with [`PipelineError::AlreadyLaunched`] unless the instance is idle. Composite daemons
  /// launch their parts before this returns, so composition errors surface here.
  pub async fn launch(&self, cancel: &CancellationToken) -> Result<(), PipelineError> {
    let control = &self.inner.control;
    let token = control.begin(cancel)?;
    debug!(daemon = control.daemon, "Launching daemon");

    let body = match self.inner.template.start(token.clone()).await {
      Ok(body) => body,
      Err(err) => {
        debug!(daemon = control.daemon, error = %err, "Daemon failed to start");
        token.cancel();
        control.finish();
        return Err(err);
      }
    };

    let inner = Arc::clone(&self.inner);
    tokio::spawn(async move {
      inner.drive(body, token).await;
    });
    Ok(())
  }

  pub fn name(&self) -> &'static str {
    self.inner.control.daemon
  }

  pub fn input(&self) -> &Channel<I> {
    &self.inner.input
  }

  pub fn output(&self) -> &Channel<O> {
    &self.inner.output
  }

  pub fn errors(&self) -> &ErrorChannel {
    &self.inner.errors
  }

  pub fn state(&self) -> InstanceState {
    self.inner.control.state()
  }

  pub fn is_launched(&self) -> bool {
    self.inner.control.is_launched()
  }

  /// Cancel the instance scope. No-op unless running.
  pub fn stop(&self) {
    self.inner.control.stop();
  }

  /// Block until the instance task has exited.
  pub async fn wait(&self) {
    self.inner.control.wait().await;
  }

  pub fn close(&self) {
    self.inner.input.close();
    self.inner.output.close();
  }

  /// A fresh, unlaunched copy of the template this instance runs.
  pub fn template(&self) -> Box<dyn Daemon<I, O>> {
    self.inner.template.clone_daemon()
  }

  pub fn handle(&self) -> Handle {
    Handle {
      control: Arc::clone(&self.inner.control),
    }
  }
}

impl<I: Message, O: Message> Inner<I, O> {
  async fn drive(&self, body: Body, token: CancellationToken) {
    let daemon = self.control.daemon;
    let result = match AssertUnwindSafe(body).catch_unwind().await {
      Ok(result) => result,
      Err(panic) => Err(PipelineError::Panicked {
        daemon,
        message: panic_message(panic.as_ref()),
      }),
    };

    match result {
      Ok(()) => trace!(daemon, "Daemon finished"),
      Err(err) if err.is_cancelled() => trace!(daemon, "Daemon cancelled"),
      Err(err) => {
        warn!(daemon, error = %err, "Daemon failed");
        report_error(&self.errors, &token, err).await;
      }
    }

    if self.template.closes_channels_on_stop() {
      self.output.close();
    }
    self.control.finish();
  }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
  if let Some(message) = panic.downcast_ref::<&str>() {
    (*message).to_string()
  } else if let Some(message) = panic.downcast_ref::<String>() {
    message.clone()
  } else {
    "unknown panic".to_string()
  }
}

// ============================================================================
// Shared helpers for composite daemons
// ============================================================================

/// Offer `err` once on `errors`. Dropped when `cancel` fires first.
pub(crate) async fn report_error(errors: &ErrorChannel, cancel: &CancellationToken, err: PipelineError) {
  if err.is_cancelled() {
    return;
  }
  if let Err(dropped) = errors.send(cancel, err).await {
    trace!(reason = %dropped, "Error not delivered");
  }
}

/// Use `part` as is when it is already running, otherwise launch a fresh instance of it.
pub(crate) async fn launch_part<I: Message, O: Message>(
  part: &dyn Daemon<I, O>,
  cancel: &CancellationToken,
) -> Result<Instance<I, O>, PipelineError> {
  if let Some(instance) = part.as_instance() {
    if !instance.is_launched() {
      instance.launch(cancel).await?;
    }
    return Ok(instance);
  }

  let instance = Instance::new(part.clone_daemon())?;
  instance.launch(cancel).await?;
  Ok(instance)
}

/// Join every part, or stop them all and then join when `cancel` fires.
pub(crate) async fn join_parts(cancel: &CancellationToken, parts: &[Handle]) {
  let all_done = join_all(parts.iter().map(|part| part.wait()));
  tokio::select! {
      biased;
      _ = cancel.cancelled() => {
          trace!(parts = parts.len(), "Stopping parts");
          for part in parts {
            part.stop();
          }
          join_all(parts.iter().map(|part| part.wait())).await;
      }
      _ = all_done => {}
  }
}

// ============================================================================
// Running instances as pre-started parts
// ============================================================================

#[async_trait]
impl<I: Message, O: Message> Daemon<I, O> for Instance<I, O> {
  fn name(&self) -> &'static str {
    self.inner.control.daemon
  }

  fn input(&self) -> Option<Channel<I>> {
    Some(self.inner.input.clone())
  }

  fn output(&self) -> Option<Channel<O>> {
    Some(self.inner.output.clone())
  }

  fn errors(&self) -> Option<ErrorChannel> {
    Some(self.inner.errors.clone())
  }

  fn set_input(&mut self, channel: Channel<I>) {
    if !channel.same_channel(&self.inner.input) {
      debug!(daemon = self.name(), "Ignoring input rewire of an instance");
    }
  }

  fn set_output(&mut self, channel: Channel<O>) {
    if !channel.same_channel(&self.inner.output) {
      debug!(daemon = self.name(), "Ignoring output rewire of an instance");
    }
  }

  fn set_errors(&mut self, channel: ErrorChannel) {
    if !channel.same_channel(&self.inner.errors) {
      debug!(daemon = self.name(), "Ignoring error channel rewire of an instance");
    }
  }

  fn disable_close_channels_on_stop(&mut self, _disabled: bool) {
    debug!(daemon = self.name(), "Close-on-stop is fixed once an instance exists");
  }

  fn closes_channels_on_stop(&self) -> bool {
    self.inner.template.closes_channels_on_stop()
  }

  fn set_channel_capacity(&mut self, _capacity: usize) {}

  fn is_launched(&self) -> bool {
    self.inner.control.is_launched()
  }

  fn clone_daemon(&self) -> Box<dyn Daemon<I, O>> {
    Box::new(self.clone())
  }

  fn wire(&mut self) -> Result<(), PipelineError> {
    Ok(())
  }

  fn as_instance(&self) -> Option<Instance<I, O>> {
    Some(self.clone())
  }

  async fn start(&self, cancel: CancellationToken) -> Result<Body, PipelineError> {
    if !Instance::is_launched(self) {
      self.launch(&cancel).await?;
    }
    let parts = vec![self.handle()];
    Ok(Box::pin(async move {
      join_parts(&cancel, &parts).await;
      Ok(())
    }))
  }

  async fn run(&self, cancel: &CancellationToken) -> Result<Instance<I, O>, PipelineError> {
    self.launch(cancel).await?;
    Ok(self.clone())
  }
}
