// YAML configuration parsing

use crate::template::expand_template;
use sqspoller_core::domain::PollerConfig;
use sqspoller_core::error::{AppError, Result};
use tracing::debug;

/// Expand templates and parse a poller configuration document
///
/// # Errors
/// - AppError::Config on unresolved placeholders, malformed YAML or an empty `worker_class`
pub fn parse_config(content: &str) -> Result<PollerConfig> {
    let expanded = expand_template(content)?;
    parse_expanded(&expanded)
}

fn parse_expanded(content: &str) -> Result<PollerConfig> {
    let config: PollerConfig = serde_yml::from_str(content)
        .map_err(|e| AppError::Config(format!("invalid poller configuration: {}", e)))?;

    if config.worker_configuration.worker_class.trim().is_empty() {
        return Err(AppError::Config(
            "worker_configuration.worker_class must not be empty".to_string(),
        ));
    }

    debug!(
        groups = config.queue_groups.len(),
        worker_class = %config.worker_configuration.worker_class,
        "Parsed poller configuration"
    );
    Ok(config)
}
