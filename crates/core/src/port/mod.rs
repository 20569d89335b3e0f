// Port Layer - Interfaces for external collaborators

pub mod config_source;
pub mod flag_store;
pub mod queue_transport;
pub mod worker_task;

// Re-exports
pub use config_source::ConfigSource;
pub use flag_store::{FlagStore, FlagStoreError};
pub use queue_transport::{QueueTransport, TransportError};
pub use worker_task::{DeliveryError, WorkerTask};
