//! OpenTelemetry tracing and observability
//!
//! The base subscriber (JSON formatter + env filter) is installed exactly
//! once, in [`init_tracing`]. The OpenTelemetry span layer sits behind a
//! [`tracing_subscriber::reload::Layer`] that starts out empty, because the
//! `tracing` feature toggle can flip on after the subscriber is already
//! installed (via [`crate::feature::FeatureManager::enable`]), and a global
//! subscriber can only be set once per process.

#[cfg(feature = "observability")]
use tracing_subscriber::{layer::SubscriberExt, reload, EnvFilter, Registry};

use crate::{config::Config, error::Result};

#[cfg(feature = "observability")]
type OtelLayer =
    tracing_opentelemetry::OpenTelemetryLayer<Registry, opentelemetry_sdk::trace::Tracer>;

#[cfg(feature = "observability")]
static OTEL_RELOAD_HANDLE: std::sync::OnceLock<reload::Handle<Option<OtelLayer>, Registry>> =
    std::sync::OnceLock::new();

#[cfg(feature = "observability")]
static TRACER_PROVIDER: std::sync::OnceLock<opentelemetry_sdk::trace::SdkTracerProvider> =
    std::sync::OnceLock::new();

#[cfg(feature = "observability")]
static METER_PROVIDER: std::sync::OnceLock<opentelemetry_sdk::metrics::SdkMeterProvider> =
    std::sync::OnceLock::new();

/// Initialize tracing with OpenTelemetry
///
/// Installs the JSON-formatted subscriber plus an initially-empty reload
/// slot for the OpenTelemetry span layer. [`enable_otel_tracing`] (invoked
/// by the `tracing` feature's enabler) fills the slot in.
#[cfg(feature = "observability")]
pub fn init_tracing(config: &Config) -> Result<()> {
    let log_level = config.service.log_level.clone();
    let filter = EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let (otel_layer, reload_handle) = reload::Layer::new(None::<OtelLayer>);
    let _ = OTEL_RELOAD_HANDLE.set(reload_handle);

    let subscriber = Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .with(otel_layer);
    tracing::subscriber::set_global_default(subscriber).map_err(|e| {
        crate::error::Error::internal(format!("failed to install subscriber: {e}"))
    })?;

    tracing::info!("Tracing initialized for service: {}", config.service.name);

    Ok(())
}

/// Initialize tracing without OpenTelemetry (fallback)
#[cfg(not(feature = "observability"))]
pub fn init_tracing(config: &Config) -> Result<()> {
    let log_level = config.service.log_level.clone();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Tracing initialized for service: {}", config.service.name);

    Ok(())
}

/// Stand up the OpenTelemetry tracer and meter providers and slot the tracer
/// layer into the reload handle installed by [`init_tracing`]. Idempotent -
/// a second call is a no-op.
///
/// This is the real side effect behind `FeatureManager::enable("tracing")`:
/// it's what makes the toggle do something beyond flip a bool.
#[cfg(feature = "observability")]
pub fn enable_otel_tracing(service_name: &str) -> Result<()> {
    if TRACER_PROVIDER.get().is_some() {
        return Ok(());
    }

    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_sdk::Resource;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    let span_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()
        .map_err(|e| {
            crate::error::Error::internal(format!("failed to build OTLP span exporter: {e}"))
        })?;
    let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_resource(resource.clone())
        .with_batch_exporter(span_exporter)
        .build();
    opentelemetry::global::set_tracer_provider(tracer_provider.clone());
    let tracer = tracer_provider.tracer(service_name.to_string());

    if let Some(handle) = OTEL_RELOAD_HANDLE.get() {
        handle
            .reload(Some(tracing_opentelemetry::layer().with_tracer(tracer)))
            .map_err(|e| {
                crate::error::Error::internal(format!("failed to install otel layer: {e}"))
            })?;
    }

    let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .build()
        .map_err(|e| {
            crate::error::Error::internal(format!("failed to build OTLP metric exporter: {e}"))
        })?;
    let meter_provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
        .with_resource(resource)
        .with_periodic_exporter(metric_exporter)
        .build();
    opentelemetry::global::set_meter_provider(meter_provider.clone());

    let _ = TRACER_PROVIDER.set(tracer_provider);
    let _ = METER_PROVIDER.set(meter_provider);

    tracing::info!(service = %service_name, "OpenTelemetry tracer/meter providers initialized");

    Ok(())
}

#[cfg(not(feature = "observability"))]
pub fn enable_otel_tracing(_service_name: &str) -> Result<()> {
    Ok(())
}

/// Drop the OpenTelemetry span layer back out, leaving the base JSON
/// subscriber in place. Used when `tracing` is disabled before the server
/// has started (after start it's rejected, see [`crate::feature`]).
#[cfg(feature = "observability")]
pub fn disable_otel_tracing() {
    if let Some(handle) = OTEL_RELOAD_HANDLE.get() {
        let _ = handle.reload(None);
    }
}

#[cfg(not(feature = "observability"))]
pub fn disable_otel_tracing() {}

/// Get a meter from the global meter provider, if [`enable_otel_tracing`]
/// has run. Backs [`crate::middleware::metrics::create_metrics_layer`].
#[cfg(feature = "observability")]
pub fn get_meter() -> Option<opentelemetry::metrics::Meter> {
    use opentelemetry::metrics::MeterProvider as _;
    METER_PROVIDER.get().map(|provider| provider.meter("acton-gateway"))
}

#[cfg(not(feature = "observability"))]
pub fn get_meter() -> Option<()> {
    None
}

/// Shutdown tracing and flush spans
#[cfg(feature = "observability")]
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        let _ = provider.shutdown();
    }
    if let Some(provider) = METER_PROVIDER.get() {
        let _ = provider.shutdown();
    }
    tracing::info!("Tracing shutdown complete");
}

/// Shutdown tracing (no-op without observability feature)
#[cfg(not(feature = "observability"))]
pub fn shutdown_tracing() {
    tracing::info!("Tracing shutdown (no-op)");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(feature = "observability"))]
    fn test_init_tracing_without_otlp() {
        let config = Config::default();
        // This should not panic
        let _ = init_tracing(&config);
    }
}
