//! Pipeline configuration.
//!
//! Config priority: explicit path > `$DUCTWORK_CONFIG` > `./ductwork.toml` > defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Message, channel::DEFAULT_CHANNEL_CAPACITY, daemon::Daemon};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "DUCTWORK_CONFIG";

/// File looked up in the working directory when nothing else is given.
pub const LOCAL_CONFIG_FILE: &str = "ductwork.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
}

// ============================================================================
// Channels
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
  /// Buffer size of lazily allocated channels (minimum 1)
  pub capacity: usize,
}

impl Default for ChannelConfig {
  fn default() -> Self {
    Self {
      capacity: DEFAULT_CHANNEL_CAPACITY,
    }
  }
}

// ============================================================================
// Cluster
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
  /// Worker count for clusters built from config
  /// Default: number of CPUs
  #[serde(default = "default_workers")]
  pub workers: usize,
}

fn default_workers() -> usize {
  num_cpus::get()
}

impl Default for ClusterConfig {
  fn default() -> Self {
    Self {
      workers: default_workers(),
    }
  }
}

// ============================================================================
// Logging
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Log level: "off", "error", "warn", "info", "debug", "trace"
  /// Default: "info"
  #[serde(default = "default_log_level")]
  pub level: String,

  /// Also write logs to this file (daily rotation)
  #[serde(skip_serializing_if = "Option::is_none")]
  pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      file: None,
    }
  }
}

// ============================================================================
// Root
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub channels: ChannelConfig,
  pub cluster: ClusterConfig,
  pub logging: LoggingConfig,
}

impl Config {
  /// Parse the TOML file at `path`.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Walk the fallback chain and return the first config that loads.
  ///
  /// Unreadable or malformed files are skipped.
  pub fn load_or_default(path: Option<&Path>) -> Self {
    if let Some(path) = path
      && let Ok(config) = Self::load(path)
    {
      return config;
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV)
      && let Ok(config) = Self::load(Path::new(&env_path))
    {
      return config;
    }

    let local = Path::new(LOCAL_CONFIG_FILE);
    if local.exists()
      && let Ok(config) = Self::load(local)
    {
      return config;
    }

    Self::default()
  }

  /// Push channel settings into a daemon template (and its parts).
  pub fn apply<I: Message, O: Message>(&self, daemon: &mut (impl Daemon<I, O> + ?Sized)) {
    daemon.set_channel_capacity(self.channels.capacity.max(1));
  }

  /// Render as TOML.
  pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(self)
  }
}
