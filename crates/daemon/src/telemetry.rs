//! Telemetry setup for OpenTelemetry integration

use anyhow::Result;
use tracing_subscriber::Layer;

/// Whether an OTLP endpoint is configured
///
/// # Environment Variables
///
/// - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (e.g., http://localhost:4317)
/// - `OTEL_SERVICE_NAME`: Service name (default: chansync)
pub fn requested() -> bool {
    std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok()
}

/// OpenTelemetry layer, or None when no endpoint is configured or the
/// `telemetry` feature is off.
pub fn layer<S>() -> Result<Option<Box<dyn Layer<S> + Send + Sync>>>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span> + 'static,
{
    if !requested() {
        return Ok(None);
    }

    #[cfg(feature = "telemetry")]
    {
        layer_impl().map(Some)
    }

    #[cfg(not(feature = "telemetry"))]
    {
        Ok(None)
    }
}

#[cfg(feature = "telemetry")]
fn layer_impl<S>() -> Result<Box<dyn Layer<S> + Send + Sync>>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span> + 'static,
{
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::{SpanExporter, WithExportConfig};
    use opentelemetry_sdk::{runtime, trace::TracerProvider, Resource};

    let service_name =
        std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "chansync".to_string());
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")?;

    let exporter = SpanExporter::builder()
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

    Ok(Box::new(tracing_opentelemetry::layer().with_tracer(tracer)))
}
