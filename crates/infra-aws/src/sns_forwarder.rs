// SNS forwarding worker task

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_sns::error::DisplayErrorContext;
use aws_sdk_sns::Client;
use serde::Deserialize;
use sqspoller_core::domain::WorkerConfig;
use sqspoller_core::error::{AppError, Result};
use sqspoller_core::port::{DeliveryError, WorkerTask};
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct SnsForwarderSettings {
    pub sns_topic_arn: String,
}

/// Publishes each message body to one SNS topic
pub struct SnsForwarder {
    client: Client,
    topic_arn: String,
}

impl SnsForwarder {
    pub fn new(client: Client, topic_arn: impl Into<String>) -> Result<Self> {
        let topic_arn = topic_arn.into();
        if topic_arn.trim().is_empty() {
            return Err(AppError::Config("sns_topic_arn must not be empty".to_string()));
        }
        info!(topic_arn = %topic_arn, "SNS forwarder initialized");
        Ok(Self { client, topic_arn })
    }

    /// # Errors
    /// - AppError::Config if `sns_topic_arn` is missing or empty
    pub fn from_worker_config(config: &WorkerConfig, sdk_config: &SdkConfig) -> Result<Self> {
        let settings: SnsForwarderSettings = config
            .settings_as()
            .map_err(|e| AppError::Config(format!("invalid SNS forwarder settings: {}", e)))?;
        Self::new(Client::new(sdk_config), settings.sns_topic_arn)
    }

    pub fn topic_arn(&self) -> &str {
        &self.topic_arn
    }
}

#[async_trait]
impl WorkerTask for SnsForwarder {
    async fn process(&self, body: &str, message_id: &str) -> std::result::Result<(), DeliveryError> {
        let output = self
            .client
            .publish()
            .topic_arn(&self.topic_arn)
            .message(body)
            .send()
            .await
            .map_err(|e| {
                let detail = DisplayErrorContext(&e).to_string();
                warn!(message_id = %message_id, topic_arn = %self.topic_arn, error = %detail, "SNS publish failed");
                DeliveryError::Publish(detail)
            })?;

        info!(
            message_id = %message_id,
            topic_arn = %self.topic_arn,
            sns_message_id = output.message_id().unwrap_or_default(),
            "Published message"
        );
        Ok(())
    }
}
