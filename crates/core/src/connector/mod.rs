//! Connectors join two capabilities into one.
//!
//! Each connector is itself an [`Actor`](crate::Actor) or a [`Daemon`](crate::Daemon), so
//! connectors nest into trees. A daemon-shaped connector's input is its `from` side's input and
//! its output is its `to` side's output; both sides share a single error channel.

mod actor_daemon;
mod actors;
mod daemon_actor;
mod daemons;

pub use self::{
  actor_daemon::ActorDaemonConnector, actors::ActorsConnector, daemon_actor::DaemonActorConnector,
  daemons::DaemonsConnector,
};
