// SQS Poller Infrastructure - Redis Adapters
// Implements: FlagStore (maintenance windows), ConfigSource (central configuration)

mod config_source;
mod connection;
mod flag_store;

pub use config_source::RedisConfigSource;
pub use connection::connect;
pub use flag_store::RedisFlagStore;

// Note: redis::RedisError conversion is done in helper functions
// (orphan rules prevent From<RedisError> for AppError here)
