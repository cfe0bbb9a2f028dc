use anyhow::Result;
use once_cell::sync::Lazy;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const SERVICE_NAME: &str = "grc-agents";

static TRACER_PROVIDER: Lazy<Mutex<Option<TracerProvider>>> = Lazy::new(|| Mutex::new(None));

/// Install the global subscriber. The OpenTelemetry layer is only added when
/// an OTLP endpoint is configured.
pub fn init_tracing_with_level(level: &str, otlp_endpoint: Option<&str>) -> Result<()> {
    let otel_layer = match otlp_endpoint {
        Some(endpoint) => {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()?;

            let tracer_provider = TracerProvider::builder()
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", SERVICE_NAME),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ]))
                .with_batch_exporter(exporter, runtime::Tokio)
                .build();

            let tracer = tracer_provider.tracer(SERVICE_NAME);
            global::set_tracer_provider(tracer_provider.clone());
            global::set_text_map_propagator(TraceContextPropagator::new());
            if let Ok(mut slot) = TRACER_PROVIDER.lock() {
                *slot = Some(tracer_provider);
            }

            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(false);

    Registry::default()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()?;

    info!("Tracing initialized with level: {}", level);
    if let Some(endpoint) = otlp_endpoint {
        info!("OpenTelemetry exporting to {}", endpoint);
    }

    Ok(())
}

/// Flush pending spans; safe to call when OTLP export was never enabled
pub fn shutdown_tracer() {
    let provider = TRACER_PROVIDER.lock().ok().and_then(|mut slot| slot.take());
    if let Some(provider) = provider {
        if let Err(e) = provider.shutdown() {
            eprintln!("Error shutting down tracer provider: {e}");
        }
    }
}
