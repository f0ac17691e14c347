//! Declarative registry configuration.
//!
//! ```ron
//! (
//!     adapters: [
//!         (prefix: "scratch", root_path: "/", kind: Memory),
//!         (prefix: "data", root_path: "/srv/data", kind: Local),
//!     ],
//! )
//! ```
//!
//! Only adapters that own their storage can be built from configuration.
//! FTP and SFTP adapters need a live protocol client and are registered
//! with [`FileSystem::add_adapter`] instead. The optional `retry` section
//! is carried on the built facade as [`FileSystem::retry_policy`] for them:
//!
//! ```ignore
//! let fs = FileSystem::from_config(&config)?;
//! fs.add_adapter(FtpAdapter::new("ftp", "/", client).with_retry(fs.retry_policy()))
//!     .await?;
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::adapter::Adapter;
use super::backends::{LocalAdapter, MemoryAdapter, RetryPolicy};
use super::filesystem::FileSystem;
use super::logging::LogSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdapterKind {
    Local,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub prefix: String,
    #[serde(default = "default_root_path")]
    pub root_path: String,
    pub kind: AdapterKind,
}

fn default_root_path() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSystemConfig {
    #[serde(default)]
    pub adapters: Vec<AdapterConfig>,
    /// Lookup retry for remote adapters registered alongside this config.
    /// Exposed on the built facade as [`FileSystem::retry_policy`].
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("adapter #{index} has an empty prefix")]
    EmptyPrefix { index: usize },
    #[error("prefix '{prefix}' is configured more than once")]
    DuplicatePrefix { prefix: String },
}

impl FileSystemConfig {
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: FileSystemConfig = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn from_ron_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_ron(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (index, adapter) in self.adapters.iter().enumerate() {
            if adapter.prefix.is_empty() {
                return Err(ConfigError::EmptyPrefix { index });
            }
            if !seen.insert(adapter.prefix.as_str()) {
                return Err(ConfigError::DuplicatePrefix {
                    prefix: adapter.prefix.clone(),
                });
            }
        }
        Ok(())
    }
}

impl AdapterConfig {
    pub fn build(&self, log: &LogSink) -> Arc<dyn Adapter> {
        match self.kind {
            AdapterKind::Local => Arc::new(
                LocalAdapter::new(&self.prefix, &self.root_path).with_log_sink(log.clone()),
            ),
            AdapterKind::Memory => Arc::new(
                MemoryAdapter::new(&self.prefix, &self.root_path).with_log_sink(log.clone()),
            ),
        }
    }
}

impl FileSystem {
    /// Build a registry from configuration, logging to the ambient subscriber.
    pub fn from_config(config: &FileSystemConfig) -> Result<Self, ConfigError> {
        Self::from_config_with_log(config, LogSink::ambient())
    }

    pub fn from_config_with_log(
        config: &FileSystemConfig,
        log: LogSink,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let adapters = config.adapters.iter().map(|a| a.build(&log));
        Ok(FileSystem::with_adapters(adapters)
            .with_retry_policy(config.retry)
            .with_log_sink(log))
    }
}
