// Redis FlagStore implementation

use crate::connection::to_flag_store_error;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sqspoller_core::port::{FlagStore, FlagStoreError};
use tracing::debug;

/// Flag presence is `EXISTS key`
#[derive(Clone)]
pub struct RedisFlagStore {
    connection: ConnectionManager,
}

impl RedisFlagStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl FlagStore for RedisFlagStore {
    async fn is_set(&self, key: &str) -> Result<bool, FlagStoreError> {
        let mut connection = self.connection.clone();
        let present: bool = connection.exists(key).await.map_err(to_flag_store_error)?;
        debug!(key = %key, present = present, "Checked flag");
        Ok(present)
    }
}
