// File-backed configuration source (static mode)

use crate::parser::parse_config;
use async_trait::async_trait;
use sqspoller_core::domain::PollerConfig;
use sqspoller_core::error::{AppError, Result};
use sqspoller_core::port::ConfigSource;
use std::path::{Path, PathBuf};
use tracing::info;

/// Reads the configuration document from disk on every `load`
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    /// `path` may start with `~`
    pub fn new(path: impl AsRef<str>) -> Self {
        Self {
            path: PathBuf::from(shellexpand::tilde(path.as_ref()).into_owned()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    async fn load(&self) -> Result<PollerConfig> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AppError::Config(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        let config = parse_config(&content)?;
        info!(path = %self.path.display(), "Loaded configuration file");
        Ok(config)
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}
