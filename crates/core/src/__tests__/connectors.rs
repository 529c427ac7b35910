//! Actor/daemon bridge tests.

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use tokio_util::sync::CancellationToken;

  use crate::{
    __tests__::helpers::{drain, non_negative, plus_one, running_sum, within},
    actor::{Actor, ActorExt, actor_fn},
    daemon::{Daemon, DaemonExt, FnDaemon, Io},
    error::PipelineError,
  };

  // ==========================================================================
  // Actor → Daemon
  // ==========================================================================

  #[tokio::test]
  async fn test_actor_feeds_daemon() {
    let cancel = CancellationToken::new();
    let bridge = plus_one().connect_daemon(&plus_one().as_daemon());
    let instance = Daemon::run(&bridge, &cancel).await.unwrap();

    instance.input().send(&cancel, 1).await.unwrap();
    assert_eq!(within(instance.output().recv(&cancel)).await, Some(3));

    instance.input().close();
    assert_eq!(drain(instance.output(), &cancel).await, Vec::<i64>::new());
    within(instance.wait()).await;
  }

  #[tokio::test]
  async fn test_actor_failure_is_wrapped_as_from() {
    let cancel = CancellationToken::new();
    let bridge = non_negative().connect_daemon(&plus_one().as_daemon());
    let instance = Daemon::run(&bridge, &cancel).await.unwrap();

    instance.input().send(&cancel, -1).await.unwrap();
    let err = within(instance.errors().recv(&cancel)).await.unwrap();
    assert!(matches!(err, PipelineError::Upstream { stage: "from", .. }));
    assert_eq!(err.to_string(), "error 'from' call: invalid input format: negative: -1");

    within(instance.wait()).await;
    assert!(instance.output().is_closed());
  }

  #[tokio::test]
  async fn test_call_facade_launches_lazily() {
    let cancel = CancellationToken::new();
    let bridge = plus_one().connect_daemon(&running_sum());

    assert_eq!(bridge.call(&cancel, 5).await.unwrap(), Some(6));
    assert_eq!(bridge.call(&cancel, 1).await.unwrap(), Some(8));
    bridge.shutdown();
  }

  #[tokio::test]
  async fn test_call_facade_returns_errors() {
    let cancel = CancellationToken::new();
    let bridge = non_negative().connect_daemon(&plus_one().as_daemon());

    let err = bridge.call(&cancel, -2).await.err().expect("negative input fails");
    assert!(matches!(err, PipelineError::Upstream { stage: "from", .. }));
    bridge.shutdown();
  }

  #[tokio::test]
  async fn test_call_facade_recovers_after_failure() {
    let cancel = CancellationToken::new();
    let bridge = non_negative().connect_daemon(&plus_one().as_daemon());

    let err = within(bridge.call(&cancel, -2)).await.err().expect("negative input fails");
    assert!(matches!(err, PipelineError::Upstream { stage: "from", .. }));

    assert_eq!(within(bridge.call(&cancel, 1)).await.unwrap(), Some(2));
    assert_eq!(within(bridge.call(&cancel, 3)).await.unwrap(), Some(4));
    bridge.shutdown();
  }

  #[tokio::test]
  async fn test_call_facade_outlives_first_caller() {
    let first = CancellationToken::new();
    let bridge = plus_one().connect_daemon(&running_sum());
    assert_eq!(within(bridge.call(&first, 1)).await.unwrap(), Some(2));
    first.cancel();

    let second = CancellationToken::new();
    assert_eq!(within(bridge.call(&second, 2)).await.unwrap(), Some(5));
    assert_eq!(within(bridge.call(&second, 0)).await.unwrap(), Some(6));
    bridge.shutdown();
  }

  #[tokio::test]
  async fn test_call_facade_after_shutdown() {
    let cancel = CancellationToken::new();
    let bridge = plus_one().connect_daemon(&plus_one().as_daemon());
    assert_eq!(within(bridge.call(&cancel, 1)).await.unwrap(), Some(3));

    bridge.shutdown();
    assert_eq!(within(bridge.call(&cancel, 1)).await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_call_facade_on_cancelled_scope() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let bridge = plus_one().connect_daemon(&plus_one().as_daemon());
    assert_eq!(bridge.call(&cancel, 1).await.unwrap(), None);
  }

  // ==========================================================================
  // Daemon → Actor
  // ==========================================================================

  #[tokio::test]
  async fn test_daemon_feeds_actor() {
    let cancel = CancellationToken::new();
    let bridge = plus_one().as_daemon().connect_actor(&plus_one());
    let instance = bridge.run(&cancel).await.unwrap();

    instance.input().send(&cancel, 1).await.unwrap();
    assert_eq!(within(instance.output().recv(&cancel)).await, Some(3));

    instance.stop();
    within(instance.wait()).await;
  }

  #[tokio::test]
  async fn test_daemon_actor_skips_empty_results() {
    let cancel = CancellationToken::new();
    let evens = actor_fn(|_, x: i64| Ok((x % 2 == 0).then_some(x)));
    let instance = plus_one()
      .as_daemon()
      .connect_actor(&evens)
      .with_channel_capacity(8)
      .run(&cancel)
      .await
      .unwrap();

    for x in 1..=4 {
      instance.input().send(&cancel, x).await.unwrap();
    }
    instance.input().close();

    assert_eq!(drain(instance.output(), &cancel).await, vec![2, 4]);
    within(instance.wait()).await;
  }

  #[tokio::test]
  async fn test_actor_failure_is_wrapped_as_to() {
    let cancel = CancellationToken::new();
    let minus_ten = actor_fn(|_, x: i64| Ok(Some(x - 10)));
    let instance = minus_ten
      .as_daemon()
      .connect_actor(&non_negative())
      .run(&cancel)
      .await
      .unwrap();

    instance.input().send(&cancel, 1).await.unwrap();
    let err = within(instance.errors().recv(&cancel)).await.unwrap();
    assert_eq!(err.to_string(), "error 'to' call: invalid input format: negative: -9");

    // The failed bridge stops its upstream daemon as well.
    within(instance.wait()).await;
  }

  #[tokio::test]
  async fn test_daemon_actor_exits_when_output_closes() {
    let cancel = CancellationToken::new();
    let endless = FnDaemon::new(|cancel, io: Io<(), i64>| async move {
      let mut n = 0;
      loop {
        io.send(&cancel, n).await?;
        n += 1;
      }
    })
    .named("endless");
    let instance = endless.connect_actor(&plus_one()).run(&cancel).await.unwrap();

    assert_eq!(within(instance.output().recv(&cancel)).await, Some(1));
    instance.output().close();

    // The upstream is still producing and must be stopped for the connector to finish.
    within(instance.wait()).await;
  }

  // ==========================================================================
  // Nesting
  // ==========================================================================

  #[tokio::test]
  async fn test_bridges_nest() {
    let cancel = CancellationToken::new();
    let inner = plus_one().as_daemon().connect_actor(&plus_one());
    let tree = plus_one().connect_daemon(&inner);

    let instance = Daemon::run(&tree, &cancel).await.unwrap();
    instance.input().send(&cancel, 0).await.unwrap();
    assert_eq!(within(instance.output().recv(&cancel)).await, Some(3));
    instance.stop();
    within(instance.wait()).await;

    assert_eq!(tree.call(&cancel, 10).await.unwrap(), Some(13));
    tree.shutdown();
  }
}
