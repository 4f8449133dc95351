//! Configuration for engagement-core

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("engagement-core")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementConfig {
    /// Directory holding the SQLite database and config file
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// SQLite busy timeout in milliseconds
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Attempts per write operation before contention is surfaced
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Base backoff between retry attempts in milliseconds (grows linearly)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Overall deadline per write operation in milliseconds
    #[serde(default = "default_op_deadline_ms")]
    pub op_deadline_ms: u64,

    /// Broadcast channel capacity per change topic
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_pool_size() -> u32 {
    8
}

fn default_busy_timeout_ms() -> u32 {
    5000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    25
}

fn default_op_deadline_ms() -> u64 {
    5000
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            op_deadline_ms: default_op_deadline_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl EngagementConfig {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get engagement database path
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("engagement.db")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}
