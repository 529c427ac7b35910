//! CLI command implementations

mod config;
mod replay;
mod run;

pub use config::cmd_config;
pub use replay::cmd_replay;
pub use run::cmd_run;
