// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Worker count must be positive")]
    InvalidWorkerCount,

    #[error("Waiting tasks ratio must be a positive number, got {0}")]
    InvalidWaitingTasksRatio(f64),

    #[error("Queue group not found: {0}")]
    QueueGroupNotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
