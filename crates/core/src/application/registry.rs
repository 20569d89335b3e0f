//! WorkerTaskRegistry - maps `worker_class` identifiers to delivery capabilities
//!
//! Adapters register a factory under a short identifier; aliases cover the
//! long-form class names found in existing configuration documents.

use crate::domain::WorkerConfig;
use crate::error::{AppError, Result};
use crate::port::WorkerTask;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Builds a worker task from the worker configuration
pub type WorkerTaskFactory =
    Box<dyn Fn(&WorkerConfig) -> Result<Arc<dyn WorkerTask>> + Send + Sync>;

#[derive(Default)]
pub struct WorkerTaskRegistry {
    factories: HashMap<String, WorkerTaskFactory>,
    aliases: HashMap<String, String>,
}

impl WorkerTaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under an identifier (replaces an existing one)
    pub fn register<F>(&mut self, identifier: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&WorkerConfig) -> Result<Arc<dyn WorkerTask>> + Send + Sync + 'static,
    {
        self.factories.insert(identifier.into(), Box::new(factory));
        self
    }

    /// Make `alias` resolve to an already registered identifier
    pub fn alias(&mut self, alias: impl Into<String>, identifier: impl Into<String>) -> &mut Self {
        self.aliases.insert(alias.into(), identifier.into());
        self
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.factories.contains_key(self.canonical(identifier))
    }

    /// Registered identifiers, sorted
    pub fn identifiers(&self) -> Vec<String> {
        let mut identifiers: Vec<String> = self.factories.keys().cloned().collect();
        identifiers.sort();
        identifiers
    }

    /// Build the worker task selected by `config.worker_class`
    ///
    /// # Errors
    /// - AppError::Config if the identifier is unknown or the factory rejects its settings
    pub fn build(&self, config: &WorkerConfig) -> Result<Arc<dyn WorkerTask>> {
        let identifier = self.canonical(&config.worker_class);
        let factory = self.factories.get(identifier).ok_or_else(|| {
            AppError::Config(format!(
                "unknown worker_class '{}' (known: {})",
                config.worker_class,
                self.identifiers().join(", ")
            ))
        })?;

        let task = factory(config)?;
        info!(worker_class = %config.worker_class, resolved = %identifier, "Worker task built");
        Ok(task)
    }

    fn canonical<'a>(&'a self, identifier: &'a str) -> &'a str {
        self.aliases
            .get(identifier)
            .map(String::as_str)
            .unwrap_or(identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::worker_task::mocks::MockWorkerTask;
    use tokio_test::assert_ok;

    fn registry() -> WorkerTaskRegistry {
        let mut registry = WorkerTaskRegistry::new();
        registry
            .register("mock", |_config| Ok(Arc::new(MockWorkerTask::new_success()) as Arc<dyn WorkerTask>))
            .alias("Sqspoller::MockTask", "mock");
        registry
    }

    #[test]
    fn test_build_by_identifier_and_alias() {
        let registry = registry();
        assert_ok!(registry.build(&WorkerConfig::new("mock")));
        assert_ok!(registry.build(&WorkerConfig::new("Sqspoller::MockTask")));
        assert!(registry.contains("Sqspoller::MockTask"));
    }

    #[test]
    fn test_unknown_identifier_is_config_error() {
        let registry = registry();
        let err = registry.build(&WorkerConfig::new("Nope")).err().unwrap();
        match err {
            AppError::Config(msg) => {
                assert!(msg.contains("Nope"));
                assert!(msg.contains("mock"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_factory_error_propagates() {
        let mut registry = WorkerTaskRegistry::new();
        registry.register("strict", |config| {
            if config.settings.contains_key("url") {
                Ok(Arc::new(MockWorkerTask::new_success()) as Arc<dyn WorkerTask>)
            } else {
                Err(AppError::Config("url is required".into()))
            }
        });

        assert!(registry.build(&WorkerConfig::new("strict")).is_err());
        let config = WorkerConfig::new("strict").with_setting("url", serde_json::json!("x"));
        assert_ok!(registry.build(&config));
    }
}
