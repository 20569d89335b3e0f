//! Environment templating applied to configuration documents before parsing.
//!
//! Supported forms: `${VAR}` and `${VAR:-default}`. The default is used when
//! the variable is unset or empty.

use sqspoller_core::error::{AppError, Result};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .expect("placeholder pattern is valid")
});

/// Expand placeholders from the process environment
pub fn expand_template(content: &str) -> Result<String> {
    expand_with(content, |name| std::env::var(name).ok())
}

/// Expand placeholders using `lookup` to resolve variable names
///
/// # Errors
/// - AppError::Config if a variable without default is unresolved
pub fn expand_with<F>(content: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut expanded = String::with_capacity(content.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(content) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str());

        let value = match (lookup(name), default) {
            (Some(value), Some(_)) if !value.is_empty() => value,
            (Some(value), None) => value,
            (_, Some(default)) => default.to_string(),
            (None, None) => {
                return Err(AppError::Config(format!(
                    "environment variable {} is not set",
                    name
                )))
            }
        };

        expanded.push_str(&content[last..whole.start()]);
        expanded.push_str(&value);
        last = whole.end();
    }

    expanded.push_str(&content[last..]);
    Ok(expanded)
}
