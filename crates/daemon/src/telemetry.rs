//! Logging and optional OpenTelemetry export

use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::settings::{LogFormat, Settings};

const SERVICE_NAME: &str = "infographic-engine";

/// Install the global subscriber
///
/// # Environment Variables
///
/// - `LOG_LEVEL`: filter directive (default: info)
/// - `LOG_FORMAT`: `pretty` or `json`
/// - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint, needs the `telemetry` feature
/// - `OTEL_SERVICE_NAME`: service name (default: infographic-engine)
pub fn init(settings: &Settings) -> Result<()> {
    let env_filter = EnvFilter::try_new(&settings.log_level)
        .or_else(|_| EnvFilter::try_new("info"))?;

    let fmt_layer = match settings.log_format {
        // Production: JSON structured logging
        LogFormat::Json => fmt::layer().json().boxed(),
        // Development: Pretty formatting with colors
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
    };

    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();

    #[cfg(feature = "telemetry")]
    {
        let otel_layer = match &endpoint {
            Some(endpoint) => Some(otel::layer(endpoint)?),
            None => None,
        };
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(otel_layer)
            .try_init()?;
        if let Some(endpoint) = &endpoint {
            tracing::info!(endpoint = %endpoint, "OpenTelemetry export enabled");
        }
    }

    #[cfg(not(feature = "telemetry"))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
        if endpoint.is_some() {
            tracing::warn!("OpenTelemetry endpoint set but feature 'telemetry' not enabled");
        }
    }

    Ok(())
}

/// Flush pending spans
pub fn shutdown() {
    #[cfg(feature = "telemetry")]
    opentelemetry::global::shutdown_tracer_provider();
}

#[cfg(feature = "telemetry")]
mod otel {
    use super::SERVICE_NAME;
    use anyhow::Result;
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::TracerProvider;
    use opentelemetry_sdk::{runtime, Resource};
    use tracing::Subscriber;
    use tracing_subscriber::registry::LookupSpan;

    pub fn layer<S>(endpoint: &str) -> Result<tracing_opentelemetry::OpenTelemetryLayer<S, opentelemetry_sdk::trace::Tracer>>
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        let service_name =
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| SERVICE_NAME.to_string());

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?;

        let provider = TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_resource(Resource::new(vec![KeyValue::new(
                "service.name",
                service_name.clone(),
            )]))
            .build();

        let tracer = provider.tracer(service_name);
        opentelemetry::global::set_tracer_provider(provider);

        Ok(tracing_opentelemetry::layer().with_tracer(tracer))
    }
}
