//! Fan-out tests.

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use tokio_util::sync::CancellationToken;

  use crate::{
    __tests__::helpers::{drain, plus_one, running_sum, within},
    actor::ActorExt,
    broadcast::Broadcast,
    channel::Channel,
    daemon::{Daemon, DaemonExt},
    error::PipelineError,
  };

  #[tokio::test]
  async fn test_three_pipelines_into_one_sum() {
    let cancel = CancellationToken::new();
    let sum = running_sum().run(&cancel).await.unwrap();

    let members: Vec<Box<dyn Daemon<i64, i64>>> = (0..3)
      .map(|_| Box::new(plus_one().as_daemon().connect_daemon(&sum)) as Box<dyn Daemon<i64, i64>>)
      .collect();
    let fanout = Broadcast::new(members).run(&cancel).await.unwrap();
    assert!(fanout.output().same_channel(sum.output()));

    fanout.input().send(&cancel, 1).await.unwrap();
    let mut seen = Vec::new();
    for _ in 0..3 {
      seen.push(within(sum.output().recv(&cancel)).await.unwrap());
    }
    assert_eq!(seen, vec![2, 4, 6]);

    fanout.stop();
    within(fanout.wait()).await;
    within(sum.wait()).await;
  }

  #[tokio::test]
  async fn test_every_member_sees_every_message() {
    let cancel = CancellationToken::new();
    let fanout = Broadcast::new(Vec::new())
      .with_member(&plus_one().as_daemon())
      .with_member(&plus_one().as_daemon())
      .with_member(&plus_one().as_daemon())
      .with_channel_capacity(16);
    assert_eq!(fanout.len(), 3);
    let instance = fanout.run(&cancel).await.unwrap();

    instance.input().send(&cancel, 10).await.unwrap();
    instance.input().send(&cancel, 20).await.unwrap();
    instance.input().close();

    let mut outputs = drain(instance.output(), &cancel).await;
    outputs.sort_unstable();
    assert_eq!(outputs, vec![11, 11, 11, 21, 21, 21]);
    within(instance.wait()).await;
  }

  #[tokio::test]
  async fn test_adopted_output_stays_open() {
    let cancel = CancellationToken::new();
    let shared: Channel<i64> = Channel::new(8);
    let instance = Broadcast::new(Vec::new())
      .with_member(&plus_one().as_daemon().with_output(shared.clone()))
      .with_member(&plus_one().as_daemon().with_output(shared.clone()))
      .run(&cancel)
      .await
      .unwrap();
    assert!(instance.output().same_channel(&shared));

    instance.input().send(&cancel, 1).await.unwrap();
    instance.input().close();
    within(instance.wait()).await;

    assert!(!shared.is_closed());
    assert_eq!(within(shared.recv(&cancel)).await, Some(2));
    assert_eq!(within(shared.recv(&cancel)).await, Some(2));
  }

  #[tokio::test]
  async fn test_empty_broadcast_is_rejected() {
    let cancel = CancellationToken::new();
    let fanout: Broadcast<i64, i64> = Broadcast::new(Vec::new());
    assert!(fanout.is_empty());
    let err = fanout.run(&cancel).await.err().expect("no members must fail");
    assert!(matches!(err, PipelineError::InvalidComposition(_)));
  }

  #[tokio::test]
  async fn test_stop_while_member_is_blocked() {
    let cancel = CancellationToken::new();
    // Output is never read, so members park on a full channel.
    let instance = Broadcast::new(Vec::new())
      .with_member(&plus_one().as_daemon())
      .with_member(&running_sum())
      .run(&cancel)
      .await
      .unwrap();

    for x in 0..3 {
      let _ = tokio::time::timeout(std::time::Duration::from_millis(50), instance.input().send(&cancel, x)).await;
    }
    instance.stop();
    within(instance.wait()).await;
  }
}
