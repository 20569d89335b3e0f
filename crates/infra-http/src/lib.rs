// SQS Poller Infrastructure - HTTP Adapter
// Implements: WorkerTask (forward message bodies to an HTTP endpoint)

mod forwarder;

pub use forwarder::{HttpForwarder, HttpForwarderSettings, HttpMethod};

/// Registry identifier and long-form alias for the HTTP forwarder
pub const WORKER_CLASS: &str = "http";
pub const WORKER_CLASS_ALIAS: &str = "Sqspoller::WorkerTask";
