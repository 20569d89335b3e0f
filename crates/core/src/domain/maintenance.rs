//! Maintenance window detection
//!
//! Queues named `<environment>-outbound-messages-<window_identifier>` are gated
//! by an external flag: while the flag is present their polling loops must not
//! fetch new work. Any other queue name is never gated.

use regex::Regex;
use std::sync::LazyLock;

static QUEUE_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<environment>\w+)-outbound-messages-(?P<window_identifier>[\w-]+)")
        .expect("maintenance window pattern is valid")
});

/// Maintenance gating attributes derived from a queue name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceWindowSpec {
    pub environment: String,
    pub window_identifier: String,
    /// Lookup key into the flag store; presence means "window open, do not poll"
    pub flag_key: String,
}

impl MaintenanceWindowSpec {
    /// Derive the window from a queue name, or None if the queue is never gated
    pub fn from_queue_name(queue_name: &str) -> Option<Self> {
        let captures = QUEUE_NAME_PATTERN.captures(queue_name)?;
        let environment = captures.name("environment")?.as_str().to_string();
        let window_identifier = captures.name("window_identifier")?.as_str().to_string();
        let flag_key = format!(
            "{}::OutboundMessages::MaintenanceWindowOpen::{}",
            environment, window_identifier
        );

        Some(Self {
            environment,
            window_identifier,
            flag_key,
        })
    }
}
