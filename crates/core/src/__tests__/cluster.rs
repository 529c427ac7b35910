//! Worker pool tests.

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use tokio_util::sync::CancellationToken;

  use crate::{
    __tests__::helpers::{drain, generator, plus_one, within},
    actor::{ActorExt, actor_fn},
    cluster::Cluster,
    config::ClusterConfig,
    daemon::{Daemon, DaemonExt},
    error::PipelineError,
  };

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_generator_into_cluster() {
    let cancel = CancellationToken::new();
    let pool = Cluster::new(5, &plus_one().as_daemon());
    let pipeline = generator(vec![1, 2, 3]).connect_daemon(&pool).run(&cancel).await.unwrap();

    let outputs = drain(pipeline.output(), &cancel).await;
    assert_eq!(outputs.len(), 3);
    assert_eq!(outputs.iter().max(), Some(&4));
    within(pipeline.wait()).await;
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_outputs_are_a_permutation_of_inputs() {
    let cancel = CancellationToken::new();
    let double = actor_fn(|_, x: i64| Ok(Some(x * 2)));
    let pool = Cluster::new(4, &double.as_daemon())
      .with_channel_capacity(16)
      .run(&cancel)
      .await
      .unwrap();

    let inputs: Vec<i64> = (0..200).collect();
    let feeder = {
      let input = pool.input().clone();
      let cancel = cancel.clone();
      let inputs = inputs.clone();
      tokio::spawn(async move {
        for x in inputs {
          input.send(&cancel, x).await.unwrap();
        }
        input.close();
      })
    };

    let mut outputs = drain(pool.output(), &cancel).await;
    within(feeder).await.unwrap();
    within(pool.wait()).await;

    outputs.sort_unstable();
    let expected: Vec<i64> = inputs.iter().map(|x| x * 2).collect();
    assert_eq!(outputs, expected);
  }

  #[tokio::test]
  async fn test_empty_cluster_is_rejected() {
    let cancel = CancellationToken::new();
    let pool = Cluster::new(0, &plus_one().as_daemon());
    let err = pool.run(&cancel).await.err().expect("zero workers must fail");
    assert!(matches!(err, PipelineError::InvalidComposition(_)));
  }

  #[tokio::test]
  async fn test_stop_reaches_every_worker() {
    let cancel = CancellationToken::new();
    let pool = Cluster::new(3, &plus_one().as_daemon()).run(&cancel).await.unwrap();

    pool.input().send(&cancel, 1).await.unwrap();
    assert_eq!(within(pool.output().recv(&cancel)).await, Some(2));

    pool.stop();
    within(pool.wait()).await;
    assert!(pool.output().is_closed());
  }

  #[tokio::test]
  async fn test_worker_errors_use_shared_channel() {
    let cancel = CancellationToken::new();
    let strict = actor_fn(|_, x: i64| {
      if x == 0 {
        Err(PipelineError::InvalidInput("zero".into()))
      } else {
        Ok(Some(x))
      }
    });
    let pool = Cluster::new(2, &strict.as_daemon()).run(&cancel).await.unwrap();

    pool.input().send(&cancel, 0).await.unwrap();
    let err = within(pool.errors().recv(&cancel)).await.unwrap();
    assert!(matches!(err, PipelineError::InvalidInput(msg) if msg == "zero"));

    pool.stop();
    within(pool.wait()).await;
  }

  #[test]
  fn test_from_config() {
    let pool = Cluster::from_config(&ClusterConfig { workers: 7 }, &plus_one().as_daemon());
    assert_eq!(pool.size(), 7);
    assert!(!pool.is_launched());
  }
}
