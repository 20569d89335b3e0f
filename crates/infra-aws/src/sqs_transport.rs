//! SQS implementation of the queue transport.
//!
//! Receives use long polling; every error is reported to the polling loop,
//! which treats it as transient.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::Message as SqsMessage;
use aws_sdk_sqs::Client;
use sqspoller_core::domain::{Message, QueueRef, ReceiptHandle};
use sqspoller_core::port::{QueueTransport, TransportError};
use tracing::{debug, warn};

/// Long-poll parameters for `ReceiveMessage`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveSettings {
    /// 1..=10
    pub max_messages: i32,
    /// 0..=20 seconds
    pub wait_time_seconds: i32,
}

impl Default for ReceiveSettings {
    fn default() -> Self {
        Self {
            max_messages: 10,
            wait_time_seconds: 20,
        }
    }
}

pub struct SqsTransport {
    client: Client,
    receive: ReceiveSettings,
}

impl SqsTransport {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self::from_client(Client::new(sdk_config))
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            receive: ReceiveSettings::default(),
        }
    }

    /// Values are clamped to the ranges SQS accepts
    pub fn with_receive_settings(mut self, receive: ReceiveSettings) -> Self {
        self.receive = ReceiveSettings {
            max_messages: receive.max_messages.clamp(1, 10),
            wait_time_seconds: receive.wait_time_seconds.clamp(0, 20),
        };
        self
    }

    pub fn receive_settings(&self) -> ReceiveSettings {
        self.receive
    }
}

/// Convert an SQS message; messages without a receipt handle cannot be acknowledged and are skipped
fn into_message(message: SqsMessage) -> Option<Message> {
    let receipt = message.receipt_handle()?;
    Some(Message::new(
        message.message_id().unwrap_or_default(),
        message.body().unwrap_or_default(),
        ReceiptHandle::new(receipt),
    ))
}

#[async_trait]
impl QueueTransport for SqsTransport {
    async fn resolve(&self, queue_name: &str) -> Result<QueueRef, TransportError> {
        let output = self
            .client
            .get_queue_url()
            .queue_name(queue_name)
            .send()
            .await
            .map_err(|e| {
                let missing = e
                    .as_service_error()
                    .map(|service| service.is_queue_does_not_exist())
                    .unwrap_or(false);
                if missing {
                    TransportError::QueueNotFound(queue_name.to_string())
                } else {
                    TransportError::Connection(format!(
                        "cannot resolve queue {}: {}",
                        queue_name,
                        DisplayErrorContext(&e)
                    ))
                }
            })?;

        let url = output
            .queue_url()
            .ok_or_else(|| TransportError::QueueNotFound(queue_name.to_string()))?;
        debug!(queue = %queue_name, url = %url, "Resolved queue URL");
        Ok(QueueRef::new(queue_name, url))
    }

    async fn receive(&self, queue: &QueueRef) -> Result<Vec<Message>, TransportError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&queue.url)
            .max_number_of_messages(self.receive.max_messages)
            .wait_time_seconds(self.receive.wait_time_seconds)
            .send()
            .await
            .map_err(|e| TransportError::Receive(DisplayErrorContext(&e).to_string()))?;

        let received = output.messages.unwrap_or_default();
        let total = received.len();
        let messages: Vec<Message> = received.into_iter().filter_map(into_message).collect();
        if messages.len() < total {
            warn!(
                queue = %queue.name,
                skipped = total - messages.len(),
                "Skipped messages without receipt handle"
            );
        }
        Ok(messages)
    }

    async fn delete(&self, queue: &QueueRef, receipt: &ReceiptHandle) -> Result<(), TransportError> {
        self.client
            .delete_message()
            .queue_url(&queue.url)
            .receipt_handle(receipt.as_str())
            .send()
            .await
            .map_err(|e| TransportError::Delete(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_message() {
        let sqs = SqsMessage::builder()
            .message_id("0f1e2d")
            .receipt_handle("AQEB-receipt")
            .body("{\"event\":\"created\"}")
            .build();

        let message = into_message(sqs).unwrap();
        assert_eq!(message.id, "0f1e2d");
        assert_eq!(message.body, "{\"event\":\"created\"}");
        assert_eq!(message.receipt_handle.as_str(), "AQEB-receipt");
    }

    #[test]
    fn test_message_without_receipt_is_skipped() {
        let sqs = SqsMessage::builder().message_id("x").body("{}").build();
        assert!(into_message(sqs).is_none());
    }

    #[test]
    fn test_missing_body_becomes_empty() {
        let sqs = SqsMessage::builder().receipt_handle("r").build();
        let message = into_message(sqs).unwrap();
        assert!(message.body.is_empty());
        assert!(message.id.is_empty());
    }

    #[test]
    fn test_receive_settings_are_clamped() {
        let config = aws_sdk_sqs::Config::builder()
            .behavior_version(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new("eu-west-1"))
            .build();
        let transport = SqsTransport::from_client(Client::from_conf(config))
            .with_receive_settings(ReceiveSettings {
                max_messages: 50,
                wait_time_seconds: -1,
            });

        assert_eq!(
            transport.receive_settings(),
            ReceiveSettings {
                max_messages: 10,
                wait_time_seconds: 0,
            }
        );
    }
}
