//! HTTP forwarding worker task.
//!
//! Sends each message body to a fixed URL with JSON headers. Only a `200 OK`
//! response counts as delivered; any other status or transport error leaves
//! the message on the queue.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use sqspoller_core::domain::WorkerConfig;
use sqspoller_core::error::{AppError, Result};
use sqspoller_core::port::{DeliveryError, WorkerTask};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Request timeout when `timeout` is not configured (450s)
const DEFAULT_TIMEOUT_SECS: u64 = 450;

/// Connection establishment timeout (5s)
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const JSON: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    /// Case-insensitive; only GET and POST are allowed
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "get" => Some(Self::Get),
            "post" => Some(Self::Post),
            _ => None,
        }
    }

    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

/// `worker_configuration` settings read by the forwarder
#[derive(Debug, Clone, Deserialize)]
pub struct HttpForwarderSettings {
    pub http_method: String,
    pub http_url: String,
    /// Request timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,
}

pub struct HttpForwarder {
    client: reqwest::Client,
    method: HttpMethod,
    url: String,
}

impl HttpForwarder {
    /// # Errors
    /// - AppError::Config on an unsupported method, an empty URL, or a client build failure
    pub fn new(settings: HttpForwarderSettings) -> Result<Self> {
        let method = HttpMethod::parse(&settings.http_method).ok_or_else(|| {
            AppError::Config(format!(
                "invalid http_method '{}' (expected get or post)",
                settings.http_method
            ))
        })?;
        if settings.http_url.trim().is_empty() {
            return Err(AppError::Config("http_url must not be empty".to_string()));
        }
        let timeout = Duration::from_secs(settings.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {}", e)))?;

        info!(
            method = %method,
            url = %settings.http_url,
            timeout_secs = timeout.as_secs(),
            "HTTP forwarder initialized"
        );

        Ok(Self {
            client,
            method,
            url: settings.http_url,
        })
    }

    /// Build from the `worker_configuration` section
    pub fn from_worker_config(config: &WorkerConfig) -> Result<Self> {
        let settings: HttpForwarderSettings = config
            .settings_as()
            .map_err(|e| AppError::Config(format!("invalid HTTP forwarder settings: {}", e)))?;
        Self::new(settings)
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl WorkerTask for HttpForwarder {
    async fn process(&self, body: &str, message_id: &str) -> std::result::Result<(), DeliveryError> {
        debug!(message_id = %message_id, method = %self.method, url = %self.url, "Forwarding message");

        let response = self
            .client
            .request(self.method.as_reqwest(), &self.url)
            .header(CONTENT_TYPE, JSON)
            .header(ACCEPT, JSON)
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| {
                warn!(message_id = %message_id, error = %e, "HTTP request failed");
                if e.is_timeout() {
                    DeliveryError::Timeout
                } else {
                    DeliveryError::Transport(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 200 {
            info!(message_id = %message_id, "Message forwarded");
            Ok(())
        } else {
            warn!(message_id = %message_id, status = status, "Endpoint did not return 200 OK");
            Err(DeliveryError::Status(status))
        }
    }
}
