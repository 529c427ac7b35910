//! Effective configuration

use anyhow::{Context, Result};
use ductwork::Config;

/// Print the configuration the other commands would use.
pub fn cmd_config(config: &Config) -> Result<()> {
  let rendered = config.to_toml().context("Failed to render config")?;
  print!("{rendered}");
  Ok(())
}
