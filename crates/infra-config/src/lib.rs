// SQS Poller Infrastructure - Configuration Documents
// Implements: ConfigSource (file-backed), `${VAR}` templating, YAML parsing

mod file_source;
mod parser;
mod template;

pub use file_source::FileConfigSource;
pub use parser::parse_config;
pub use template::{expand_template, expand_with};
