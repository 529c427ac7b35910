//! Append-only JSON-lines journal for ductwork pipelines.
//!
//! ```text
//! {"row":1,"data":...}
//! {"row":2,"data":...}
//! ```
//!
//! [`Journal::actor`] records every message that passes through it and hands the message on
//! unchanged. [`Journal::replay_daemon`] streams the recorded messages back out in row order.

mod error;
mod journal;

pub use error::JournalError;
pub use journal::{Journal, JournalActor};
