//! Telemetry setup for OpenTelemetry integration

use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Boxed layer installed alongside the fmt layer
pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Outcome of telemetry setup, reported once logging is installed
#[derive(Debug)]
pub enum TelemetryStatus {
    /// OTEL_EXPORTER_OTLP_ENDPOINT not set
    NotConfigured,
    /// Endpoint set but the binary was built without the `telemetry` feature
    FeatureDisabled,
    Enabled { service_name: String, endpoint: String },
    Failed(String),
}

/// Build the OpenTelemetry tracing layer if enabled
///
/// # Environment Variables
///
/// - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (e.g., http://localhost:4318)
/// - `OTEL_SERVICE_NAME`: Service name (default: sqspoller)
pub fn layer<S>() -> (Option<BoxedLayer<S>>, TelemetryStatus)
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") else {
        return (None, TelemetryStatus::NotConfigured);
    };

    #[cfg(feature = "telemetry")]
    {
        let service_name =
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "sqspoller".to_string());
        match otel_layer(&service_name, &endpoint) {
            Ok(layer) => (
                Some(layer),
                TelemetryStatus::Enabled {
                    service_name,
                    endpoint,
                },
            ),
            Err(e) => (None, TelemetryStatus::Failed(e.to_string())),
        }
    }

    #[cfg(not(feature = "telemetry"))]
    {
        let _ = endpoint;
        (None, TelemetryStatus::FeatureDisabled)
    }
}

/// Log the setup outcome (call after the subscriber is installed)
pub fn report(status: &TelemetryStatus) {
    match status {
        TelemetryStatus::NotConfigured => {
            tracing::debug!("OpenTelemetry not configured (OTEL_EXPORTER_OTLP_ENDPOINT not set)")
        }
        TelemetryStatus::FeatureDisabled => {
            tracing::warn!("OpenTelemetry endpoint set but feature 'telemetry' not enabled");
            tracing::warn!("Rebuild with: cargo build --features telemetry");
        }
        TelemetryStatus::Enabled {
            service_name,
            endpoint,
        } => tracing::info!(
            service_name = %service_name,
            endpoint = %endpoint,
            "OpenTelemetry initialized"
        ),
        TelemetryStatus::Failed(error) => tracing::warn!(
            error = %error,
            "Failed to initialize OpenTelemetry (continuing without it)"
        ),
    }
}

/// Flush pending spans
pub fn shutdown() {
    #[cfg(feature = "telemetry")]
    opentelemetry::global::shutdown_tracer_provider();
}

#[cfg(feature = "telemetry")]
fn otel_layer<S>(service_name: &str, endpoint: &str) -> anyhow::Result<BoxedLayer<S>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::TracerProvider;
    use opentelemetry_sdk::Resource;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_resource(Resource::new(vec![KeyValue::new(
            "service.name",
            service_name.to_string(),
        )]))
        .build();
    let tracer = provider.tracer("sqspoller");
    opentelemetry::global::set_tracer_provider(provider);

    Ok(tracing_opentelemetry::layer().with_tracer(tracer).boxed())
}
