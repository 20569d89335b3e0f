// Application Layer - Delegation, Polling and Orchestration

pub mod constants;
pub mod controller;
pub mod delegator;
pub mod orchestrator;
pub mod registry;
pub mod shutdown;

// Re-exports
pub use controller::{ControllerSettings, QueueController};
pub use delegator::{MessageDelegator, PendingDelivery, PoolStats, Submission};
pub use orchestrator::{total_polling_threads, ControllerHealth, Orchestrator, RefreshReport};
pub use registry::{WorkerTaskFactory, WorkerTaskRegistry};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
