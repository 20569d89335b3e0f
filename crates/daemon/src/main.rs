//! SQS Poller - Main Entry Point
//!
//! `start` runs the queues of one group from a configuration file until
//! Ctrl+C. `start-central` reads the configuration from Redis and keeps the
//! running controllers converged with it.

mod telemetry;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sqspoller_core::application::constants::{
    DEFAULT_REFRESH_INTERVAL, MAINTENANCE_RECHECK_INTERVAL,
};
use sqspoller_core::application::{
    shutdown_channel, ControllerSettings, Orchestrator, WorkerTaskRegistry,
};
use sqspoller_core::port::{ConfigSource, FlagStore, WorkerTask};
use sqspoller_infra_aws::{
    load_sdk_config, AwsSettings, ReceiveSettings, SnsForwarder, SqsTransport,
};
use sqspoller_infra_config::FileConfigSource;
use sqspoller_infra_http::HttpForwarder;
use sqspoller_infra_redis::{connect, RedisConfigSource, RedisFlagStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_LOG_FILTER: &str = "sqspoller=info";

#[derive(Parser, Debug)]
#[command(name = "sqspoller")]
#[command(about = "Polls SQS queues and delegates messages to a worker pool", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// AWS region
    #[arg(long, global = true, env = "AWS_REGION")]
    region: Option<String>,

    /// AWS access key id (default provider chain when unset)
    #[arg(long, global = true, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    access_key_id: Option<String>,

    /// AWS secret access key
    #[arg(long, global = true, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    secret_access_key: Option<String>,

    /// Redis URL; enables maintenance window gating
    #[arg(long, global = true, env = "SQSPOLLER_REDIS_URL", hide_env_values = true)]
    redis_url: Option<String>,

    /// Write logs to this file instead of stdout
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Seconds between maintenance flag checks while a window is open
    #[arg(long, global = true, default_value_t = MAINTENANCE_RECHECK_INTERVAL.as_secs())]
    maintenance_recheck_secs: u64,

    /// Long-poll wait per receive call (0-20 seconds)
    #[arg(long, global = true, default_value_t = 20)]
    receive_wait_secs: i32,

    /// Messages fetched per receive call (1-10)
    #[arg(long, global = true, default_value_t = 10)]
    receive_max_messages: i32,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the queues of one group from a configuration file
    Start {
        /// YAML configuration file (supports ${VAR} and ${VAR:-default})
        #[arg(short, long)]
        config: String,

        /// Queue group inside the configuration
        #[arg(short, long)]
        queue_group: String,
    },

    /// Start from the configuration stored in Redis and refresh periodically
    StartCentral {
        /// Redis key holding the YAML configuration document
        #[arg(short = 'k', long)]
        config_key: String,

        /// Queue group inside the configuration
        #[arg(short, long)]
        queue_group: String,

        /// Seconds between refresh cycles
        #[arg(long, default_value_t = DEFAULT_REFRESH_INTERVAL.as_secs())]
        refresh_interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Initialize logging (guard must outlive the runtime work)
    let _log_guard = init_logging(cli.global.log_file.as_deref())?;
    info!("SQS Poller v{} starting...", VERSION);

    // 2. AWS clients
    let aws = load_sdk_config(&AwsSettings {
        region: cli.global.region.clone(),
        access_key_id: cli.global.access_key_id.clone(),
        secret_access_key: cli.global.secret_access_key.clone(),
    })
    .await;
    let transport = Arc::new(SqsTransport::new(&aws).with_receive_settings(ReceiveSettings {
        max_messages: cli.global.receive_max_messages,
        wait_time_seconds: cli.global.receive_wait_secs,
    }));

    // 3. Setup dependencies (DI wiring)
    let registry = build_registry(&aws);
    let settings = ControllerSettings {
        maintenance_recheck_interval: Duration::from_secs(cli.global.maintenance_recheck_secs),
        ..Default::default()
    };

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received. Exiting gracefully...");
                shutdown_tx.shutdown();
            }
            Err(e) => {
                // Keep the sender alive: dropping it counts as shutdown
                tracing::error!(error = %e, "Cannot listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    });

    // 4. Run
    match cli.command {
        Commands::Start {
            config,
            queue_group,
        } => {
            let flag_store = match &cli.global.redis_url {
                Some(url) => {
                    let connection = connect(url)
                        .await
                        .context("Redis (maintenance flags) unreachable")?;
                    Some(Arc::new(RedisFlagStore::new(connection)) as Arc<dyn FlagStore>)
                }
                None => None,
            };

            let source = FileConfigSource::new(&config);
            let poller_config = source
                .load()
                .await
                .with_context(|| format!("Failed to load configuration from {}", source.describe()))?;

            let mut orchestrator = Orchestrator::new(transport, flag_store, registry, settings);
            orchestrator
                .run_static(&poller_config, &queue_group, shutdown_rx)
                .await
                .with_context(|| format!("Failed to run queue group {}", queue_group))?;
        }
        Commands::StartCentral {
            config_key,
            queue_group,
            refresh_interval_secs,
        } => {
            let url = cli
                .global
                .redis_url
                .as_deref()
                .context("--redis-url (or SQSPOLLER_REDIS_URL) is required for start-central")?;
            let connection = connect(url).await.context("Redis (central configuration) unreachable")?;

            let flag_store = Some(Arc::new(RedisFlagStore::new(connection.clone())) as Arc<dyn FlagStore>);
            let source = RedisConfigSource::new(connection, config_key);

            let mut orchestrator = Orchestrator::new(transport, flag_store, registry, settings);
            orchestrator
                .start_all_with_refresh(
                    &source,
                    &queue_group,
                    Duration::from_secs(refresh_interval_secs),
                    shutdown_rx,
                )
                .await
                .with_context(|| format!("Failed to run queue group {} from {}", queue_group, source.describe()))?;
        }
    }

    telemetry::shutdown();
    info!("Shutdown complete.");
    Ok(())
}

/// Install the tracing subscriber (format from `SQSPOLLER_LOG_FORMAT=json|pretty`)
fn init_logging(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let log_format =
        std::env::var("SQSPOLLER_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))
        .context("Failed to create env filter")?;

    let (writer, guard) = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Cannot open log file {}", path.display()))?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stdout), None),
    };

    let (otel, telemetry_status) = telemetry::layer();

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(otel)
                .with(fmt::layer().json().with_writer(writer))
                .init();
        }
        _ => {
            // Development: Pretty formatting (colors only on a terminal stream)
            tracing_subscriber::registry()
                .with(env_filter)
                .with(otel)
                .with(fmt::layer().pretty().with_ansi(log_file.is_none()).with_writer(writer))
                .init();
        }
    }

    telemetry::report(&telemetry_status);
    Ok(guard)
}

/// Delivery capabilities selectable through `worker_class`
fn build_registry(aws: &sqspoller_infra_aws::SdkConfig) -> WorkerTaskRegistry {
    let mut registry = WorkerTaskRegistry::new();

    registry
        .register(sqspoller_infra_http::WORKER_CLASS, |config| {
            Ok(Arc::new(HttpForwarder::from_worker_config(config)?) as Arc<dyn WorkerTask>)
        })
        .alias(
            sqspoller_infra_http::WORKER_CLASS_ALIAS,
            sqspoller_infra_http::WORKER_CLASS,
        );

    let sdk_config = aws.clone();
    registry
        .register(sqspoller_infra_aws::WORKER_CLASS, move |config| {
            Ok(Arc::new(SnsForwarder::from_worker_config(config, &sdk_config)?) as Arc<dyn WorkerTask>)
        })
        .alias(
            sqspoller_infra_aws::WORKER_CLASS_ALIAS,
            sqspoller_infra_aws::WORKER_CLASS,
        );

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use sqspoller_core::domain::WorkerConfig;
    use sqspoller_core::AppError;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_start() {
        let cli = Cli::try_parse_from([
            "sqspoller",
            "start",
            "--config",
            "poller.yml",
            "--queue-group",
            "outbound",
            "--region",
            "eu-west-1",
        ])
        .unwrap();

        match cli.command {
            Commands::Start {
                config,
                queue_group,
            } => {
                assert_eq!(config, "poller.yml");
                assert_eq!(queue_group, "outbound");
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.global.region.as_deref(), Some("eu-west-1"));
        assert_eq!(cli.global.maintenance_recheck_secs, 300);
    }

    #[test]
    fn test_parse_start_central_defaults() {
        let cli = Cli::try_parse_from([
            "sqspoller",
            "start-central",
            "--config-key",
            "sqspoller::config",
            "--queue-group",
            "outbound",
            "--redis-url",
            "redis://localhost:6379",
        ])
        .unwrap();

        match cli.command {
            Commands::StartCentral {
                refresh_interval_secs,
                ..
            } => assert_eq!(refresh_interval_secs, 60),
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.global.redis_url.as_deref(), Some("redis://localhost:6379"));
    }

    #[test]
    fn test_missing_queue_group_is_rejected() {
        assert!(Cli::try_parse_from(["sqspoller", "start", "--config", "poller.yml"]).is_err());
    }

    fn sdk_config() -> sqspoller_infra_aws::SdkConfig {
        sqspoller_infra_aws::SdkConfig::builder()
            .behavior_version(sqspoller_infra_aws::BehaviorVersion::latest())
            .region(sqspoller_infra_aws::Region::new("eu-west-1"))
            .build()
    }

    #[test]
    fn test_registry_resolves_builtin_classes_and_aliases() {
        let registry = build_registry(&sdk_config());

        let http = WorkerConfig::new("Sqspoller::WorkerTask")
            .with_setting("http_method", serde_json::json!("post"))
            .with_setting("http_url", serde_json::json!("http://localhost:9000/hook"));
        assert!(registry.build(&http).is_ok());

        let sns = WorkerConfig::new("sns").with_setting(
            "sns_topic_arn",
            serde_json::json!("arn:aws:sns:eu-west-1:123456789012:outbound"),
        );
        assert!(registry.build(&sns).is_ok());
        assert!(registry.contains("Sqspoller::SnsForwarder"));
    }

    #[test]
    fn test_registry_rejects_unknown_class() {
        let registry = build_registry(&sdk_config());
        let result = registry.build(&WorkerConfig::new("Sqspoller::Unknown"));
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
