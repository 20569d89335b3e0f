// Redis-backed configuration source (refresh mode)
//
// The whole YAML document lives under a single string key and is re-read on
// every refresh cycle.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sqspoller_core::domain::PollerConfig;
use sqspoller_core::error::{AppError, Result};
use sqspoller_core::port::ConfigSource;
use sqspoller_infra_config::parse_config;
use tracing::debug;

pub struct RedisConfigSource {
    connection: ConnectionManager,
    key: String,
}

impl RedisConfigSource {
    pub fn new(connection: ConnectionManager, key: impl Into<String>) -> Self {
        Self {
            connection,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl ConfigSource for RedisConfigSource {
    async fn load(&self) -> Result<PollerConfig> {
        let mut connection = self.connection.clone();
        let document: Option<String> = connection.get(&self.key).await.map_err(|e| {
            AppError::Config(format!("cannot read configuration key {}: {}", self.key, e))
        })?;

        let document = document.ok_or_else(|| {
            AppError::Config(format!("configuration key {} not found", self.key))
        })?;
        debug!(key = %self.key, bytes = document.len(), "Fetched configuration document");

        parse_config(&document)
    }

    fn describe(&self) -> String {
        format!("redis:{}", self.key)
    }
}
