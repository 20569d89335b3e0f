// Delivery Outcome Domain Model
//
// The delegator reports one of these per submitted message. Only `Delivered`
// allows the source message to be deleted; everything else leaves it on the
// queue for redelivery after the visibility timeout.

use std::fmt;
use thiserror::Error;

/// Failure reported by a delivery capability (HTTP endpoint, pub/sub topic)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Sink responded with status {0}")]
    Status(u16),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Delivery timed out")]
    Timeout,

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Why the pool refused a submission without invoking the worker task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The pool queue was still full after the dispatch grace interval
    PoolSaturated,
    /// The delegator is shutting down
    PoolClosed,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::PoolSaturated => f.write_str("pool saturated"),
            RejectReason::PoolClosed => f.write_str("pool closed"),
        }
    }
}

/// Why an accepted unit of work did not deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The worker task returned an error
    Task(DeliveryError),
    /// The worker task panicked; the pool worker survived
    Panicked(String),
    /// The unit of work was dropped before reporting (pool torn down)
    Abandoned,
}

impl FailureReason {
    /// Stable label, suitable for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            FailureReason::Task(DeliveryError::Status(_)) => "status",
            FailureReason::Task(DeliveryError::Transport(_)) => "transport",
            FailureReason::Task(DeliveryError::Timeout) => "timeout",
            FailureReason::Task(DeliveryError::Publish(_)) => "publish",
            FailureReason::Task(DeliveryError::InvalidConfig(_)) => "invalid_config",
            FailureReason::Panicked(_) => "panicked",
            FailureReason::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Task(e) => write!(f, "{}", e),
            FailureReason::Panicked(msg) => write!(f, "worker task panicked: {}", msg),
            FailureReason::Abandoned => f.write_str("unit of work abandoned"),
        }
    }
}

/// Per-message result of delegation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Rejected(RejectReason),
    Failed(FailureReason),
}

impl DeliveryOutcome {
    pub fn should_delete(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered => "delivered",
            DeliveryOutcome::Rejected(_) => "rejected",
            DeliveryOutcome::Failed(_) => "failed",
        }
    }
}
