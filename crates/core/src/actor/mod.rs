//! Actors: synchronous request/response units.
//!
//! An [`Actor`] maps one input to at most one output. `Ok(None)` means "nothing to emit for this
//! input"; connectors treat it as a no-op rather than a failure. Actors are immutable and may be
//! called concurrently; the framework adds no exclusivity.

mod adapter;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use self::adapter::ActorDaemon;
use crate::{
  Message,
  connector::{ActorDaemonConnector, ActorsConnector},
  daemon::Daemon,
  error::PipelineError,
};

#[async_trait]
pub trait Actor<I: Message, O: Message>: Send + Sync + 'static {
  async fn call(&self, cancel: &CancellationToken, input: I) -> Result<Option<O>, PipelineError>;
}

/// Composition helpers available on every cloneable actor.
pub trait ActorExt<I: Message, O: Message>: Actor<I, O> + Clone {
  /// `to.call(self.call(x))`, short-circuiting on `None`.
  fn connect_actor<P: Message, B: Actor<O, P> + Clone>(&self, to: &B) -> ActorsConnector<Self, B, O> {
    ActorsConnector::new(self.clone(), to.clone())
  }

  /// Run `to` downstream of this actor. `to` is cloned.
  fn connect_daemon<P: Message>(&self, to: &(impl Daemon<O, P> + ?Sized)) -> ActorDaemonConnector<Self, I, O, P> {
    ActorDaemonConnector::new(self.clone(), to)
  }

  /// Wrap this actor in a daemon calling it once per inbound message.
  fn as_daemon(&self) -> ActorDaemon<Self, I, O> {
    ActorDaemon::new(self.clone())
  }
}

impl<I: Message, O: Message, A: Actor<I, O> + Clone> ActorExt<I, O> for A {}

// ============================================================================
// Function actor
// ============================================================================

/// An actor backed by a plain synchronous closure.
pub struct FnActor<F> {
  f: Arc<F>,
}

impl<F> Clone for FnActor<F> {
  fn clone(&self) -> Self {
    Self { f: Arc::clone(&self.f) }
  }
}

/// Build an actor from `f(cancel, input)`.
pub fn actor_fn<I, O, F>(f: F) -> FnActor<F>
where
  I: Message,
  O: Message,
  F: Fn(&CancellationToken, I) -> Result<Option<O>, PipelineError> + Send + Sync + 'static,
{
  FnActor { f: Arc::new(f) }
}

#[async_trait]
impl<I, O, F> Actor<I, O> for FnActor<F>
where
  I: Message,
  O: Message,
  F: Fn(&CancellationToken, I) -> Result<Option<O>, PipelineError> + Send + Sync + 'static,
{
  async fn call(&self, cancel: &CancellationToken, input: I) -> Result<Option<O>, PipelineError> {
    (self.f)(cancel, input)
  }
}
