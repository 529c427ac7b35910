//! Actor → Actor chaining.

use std::marker::PhantomData;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{Message, actor::Actor, error::PipelineError};

/// Calls `from`, then `to` on its output. No tasks are involved.
///
/// `M` is the type passed between the two actors.
pub struct ActorsConnector<A, B, M> {
  from: A,
  to: B,
  _link: PhantomData<fn(M) -> M>,
}

impl<A, B, M> ActorsConnector<A, B, M> {
  pub fn new(from: A, to: B) -> Self {
    Self {
      from,
      to,
      _link: PhantomData,
    }
  }
}

impl<A: Clone, B: Clone, M> Clone for ActorsConnector<A, B, M> {
  fn clone(&self) -> Self {
    Self::new(self.from.clone(), self.to.clone())
  }
}

#[async_trait]
impl<A, B, I, M, O> Actor<I, O> for ActorsConnector<A, B, M>
where
  A: Actor<I, M>,
  B: Actor<M, O>,
  I: Message,
  M: Message,
  O: Message,
{
  async fn call(&self, cancel: &CancellationToken, input: I) -> Result<Option<O>, PipelineError> {
    match self.from.call(cancel, input).await? {
      Some(link) => self.to.call(cancel, link).await,
      None => Ok(None),
    }
  }
}
