//! Composable in-process concurrency primitives.
//!
//! Two building blocks:
//!
//! - [`Actor`]: a request/response unit, `call(cancel, input) -> Option<output>`.
//! - [`Daemon`]: a long-running process reading an input channel and writing output and error
//!   channels.
//!
//! Connectors wire them into larger pipelines and are themselves actors or daemons, so they
//! nest freely:
//!
//! ```text
//! Actor ─connect_actor──▶ Actor     = ActorsConnector      (an Actor)
//! Daemon ─connect_daemon─▶ Daemon   = DaemonsConnector     (a Daemon)
//! Actor ─connect_daemon──▶ Daemon   = ActorDaemonConnector (a Daemon, and an Actor façade)
//! Daemon ─connect_actor──▶ Actor    = DaemonActorConnector (a Daemon)
//! ```
//!
//! [`Cluster`] runs N copies of a daemon over one shared channel set (a worker pool) and
//! [`Broadcast`] replicates one input stream to several pipelines.
//!
//! Cancellation flows down from [`Daemon::run`] through child tokens; completion flows back up
//! through [`Instance::wait`].

pub mod actor;
pub mod broadcast;
pub mod channel;
pub mod cluster;
pub mod config;
pub mod connector;
pub mod daemon;
pub mod error;
pub mod sink;


pub use actor::{Actor, ActorDaemon, ActorExt, FnActor, actor_fn};
pub use broadcast::Broadcast;
pub use channel::{Channel, DEFAULT_CHANNEL_CAPACITY, ErrorChannel};
pub use cluster::Cluster;
pub use config::Config;
pub use connector::{ActorDaemonConnector, ActorsConnector, DaemonActorConnector, DaemonsConnector};
pub use daemon::{Body, Daemon, DaemonExt, FnDaemon, Handle, Instance, InstanceState, Io};
pub use error::{BoxError, PipelineError, SendError};
pub use tokio_util::sync::CancellationToken;

/// Any value that can travel between tasks.
pub trait Message: Send + 'static {}

impl<T: Send + 'static> Message for T {}

/// Everything needed to build and run pipelines.
pub mod prelude {
  pub use crate::{
    Actor, ActorExt, Broadcast, CancellationToken, Channel, Cluster, Daemon, DaemonExt, ErrorChannel, FnDaemon,
    Instance, Io, PipelineError, actor_fn,
  };
}
