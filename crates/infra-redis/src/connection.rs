// Redis Connection Setup

use redis::aio::ConnectionManager;
use redis::{ErrorKind, RedisError};
use sqspoller_core::error::{AppError, Result};
use sqspoller_core::port::FlagStoreError;
use tracing::info;

/// Open a reconnecting connection to Redis
///
/// # Errors
/// - AppError::FlagStore if the URL is invalid or the server is unreachable
pub async fn connect(redis_url: &str) -> Result<ConnectionManager> {
    let client = redis::Client::open(redis_url)
        .map_err(|e| AppError::FlagStore(FlagStoreError::Unavailable(format!("invalid redis url: {}", e))))?;

    let manager = client
        .get_connection_manager()
        .await
        .map_err(|e| AppError::FlagStore(to_flag_store_error(e)))?;

    info!("Connected to Redis");
    Ok(manager)
}

/// Connection-level failures are `Unavailable`; everything else is a query error
pub(crate) fn to_flag_store_error(error: RedisError) -> FlagStoreError {
    if error.is_io_error()
        || error.is_connection_refusal()
        || error.is_connection_dropped()
        || error.is_timeout()
        || error.kind() == ErrorKind::IoError
    {
        FlagStoreError::Unavailable(error.to_string())
    } else {
        FlagStoreError::Query(error.to_string())
    }
}
