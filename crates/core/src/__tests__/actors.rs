//! Actor chaining tests.

#[cfg(test)]
mod tests {
  use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  };

  use tokio_util::sync::CancellationToken;

  use crate::{
    __tests__::helpers::{non_negative, plus_one},
    actor::{Actor, ActorExt, actor_fn},
    error::PipelineError,
  };

  #[tokio::test]
  async fn test_plus_one_twice() {
    let cancel = CancellationToken::new();
    let chain = plus_one().connect_actor(&plus_one());
    assert_eq!(chain.call(&cancel, 0).await.unwrap(), Some(2));
  }

  #[tokio::test]
  async fn test_chain_equals_nested_calls() {
    let cancel = CancellationToken::new();
    let double = actor_fn(|_, x: i64| Ok(Some(x * 2)));
    let chain = plus_one().connect_actor(&double);

    for x in -5..5 {
      let direct = double.call(&cancel, plus_one().call(&cancel, x).await.unwrap().unwrap()).await;
      assert_eq!(chain.call(&cancel, x).await.unwrap(), direct.unwrap());
    }
  }

  #[tokio::test]
  async fn test_none_short_circuits() {
    let cancel = CancellationToken::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = {
      let calls = Arc::clone(&calls);
      actor_fn(move |_, x: i64| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(x))
      })
    };
    let nothing = actor_fn(|_, _: i64| Ok(None::<i64>));

    let chain = nothing.connect_actor(&counted);
    assert_eq!(chain.call(&cancel, 1).await.unwrap(), None);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_from_error_is_returned_unchanged() {
    let cancel = CancellationToken::new();
    let chain = non_negative().connect_actor(&plus_one());

    assert_eq!(chain.call(&cancel, 3).await.unwrap(), Some(4));
    assert!(matches!(
      chain.call(&cancel, -3).await,
      Err(PipelineError::InvalidInput(msg)) if msg == "negative: -3"
    ));
  }

  #[tokio::test]
  async fn test_chains_nest() {
    let cancel = CancellationToken::new();
    let two = plus_one().connect_actor(&plus_one());
    let four = two.connect_actor(&two);
    assert_eq!(four.call(&cancel, 10).await.unwrap(), Some(14));
  }
}
