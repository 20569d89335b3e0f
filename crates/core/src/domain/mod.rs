// Domain Layer - Pure data types shared by the delegation engine

pub mod config;
pub mod error;
pub mod maintenance;
pub mod message;
pub mod outcome;
pub mod queue;

// Re-exports
pub use config::{PollerConfig, QueueSettings, WorkerConfig};
pub use error::DomainError;
pub use maintenance::MaintenanceWindowSpec;
pub use message::{Message, MessageId, ReceiptHandle};
pub use outcome::{DeliveryError, DeliveryOutcome, FailureReason, RejectReason};
pub use queue::{QueueDescriptor, QueueRef};
