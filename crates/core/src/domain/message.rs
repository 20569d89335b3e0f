// Message Domain Model

use std::fmt;

/// Transport-assigned message identifier
pub type MessageId = String;

/// Acknowledgment token returned with a received message, used only for deletion
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message received from a queue
///
/// Immutable once received. Owned by the polling loop that received it until
/// it is handed to the delegator.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: MessageId,
    pub body: String,
    pub receipt_handle: ReceiptHandle,
}

impl Message {
    pub fn new(
        id: impl Into<MessageId>,
        body: impl Into<String>,
        receipt_handle: ReceiptHandle,
    ) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            receipt_handle,
        }
    }
}
