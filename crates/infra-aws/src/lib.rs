// SQS Poller Infrastructure - AWS Adapters
// Implements: QueueTransport (SQS), WorkerTask (SNS forwarding)

mod config;
mod sns_forwarder;
mod sqs_transport;

pub use aws_config::{BehaviorVersion, Region, SdkConfig};
pub use config::{load_sdk_config, AwsSettings};
pub use sns_forwarder::{SnsForwarder, SnsForwarderSettings};
pub use sqs_transport::{ReceiveSettings, SqsTransport};

/// Registry identifier and long-form alias for the SNS forwarder
pub const WORKER_CLASS: &str = "sns";
pub const WORKER_CLASS_ALIAS: &str = "Sqspoller::SnsForwarder";
