// Poller Configuration Model
//
// Document shape (YAML on disk or in the central store):
//
//   worker_configuration:
//     concurrency: 8            # optional, defaults to total polling threads
//     waiting_tasks_ratio: 1    # optional, defaults to 1
//     worker_class: http        # delivery capability identifier
//     http_method: post         # implementation-specific settings follow
//     http_url: https://...
//   outbound:                   # queue group name
//     prod-outbound-messages-acme:
//       polling_threads: 2

use super::error::DomainError;
use super::queue::QueueDescriptor;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Worker pool settings and delivery capability selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub concurrency: Option<usize>,

    #[serde(default)]
    pub waiting_tasks_ratio: Option<f64>,

    /// Identifier resolved through the WorkerTaskRegistry
    pub worker_class: String,

    /// Implementation-specific settings (http_url, sns_topic_arn, ...)
    #[serde(flatten)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl WorkerConfig {
    pub fn new(worker_class: impl Into<String>) -> Self {
        Self {
            worker_class: worker_class.into(),
            ..Default::default()
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    /// Decode the implementation-specific settings into a typed struct
    pub fn settings_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(self.settings.clone()))
    }
}

/// Per-queue settings inside a queue group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSettings {
    pub polling_threads: usize,
}

/// Complete poller configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollerConfig {
    pub worker_configuration: WorkerConfig,

    /// Queue group name -> (queue name -> settings)
    #[serde(flatten)]
    pub queue_groups: BTreeMap<String, BTreeMap<String, QueueSettings>>,
}

impl PollerConfig {
    /// Queues of one group, in name order
    pub fn queue_group(&self, group: &str) -> Result<Vec<QueueDescriptor>, DomainError> {
        let queues = self
            .queue_groups
            .get(group)
            .ok_or_else(|| DomainError::QueueGroupNotFound(group.to_string()))?;

        Ok(queues
            .iter()
            .map(|(name, settings)| QueueDescriptor::new(name.clone(), settings.polling_threads))
            .collect())
    }
}
