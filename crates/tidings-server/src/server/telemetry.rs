//! # Logging and Telemetry
//!
//! Structured logs are always on: a `tracing_subscriber` registry with an
//! `EnvFilter` (`RUST_LOG`, default `info`) and a human-readable `fmt` layer.
//!
//! OpenTelemetry export is opt-in through cargo features.
//!
//! ## Feature matrix
//!
//! - `otel`: exports spans through `tracing-opentelemetry`.
//! - `metrics`: exports counters and histograms (requests, streams in flight,
//!   stream errors, auth failures, messages sent, stream duration).
//! - `stdout`: prints exported spans/metrics to stdout.
//! - `otlp`: ships them to an OTLP collector over gRPC. The endpoint is read
//!   from `OTEL_EXPORTER_OTLP_ENDPOINT`.
//!
//! Exporters require at least one of `otel` or `metrics`.
//!
//! ```bash
//! cargo run --bin tidings-server --features otel,metrics,otlp
//! ```
//!
//! Without `metrics`, every recording helper below compiles to a no-op.

#[cfg(all(feature = "otlp", not(any(feature = "otel", feature = "metrics"))))]
compile_error!("The 'otlp' feature requires at least one of 'otel' or 'metrics' to be enabled.");

#[cfg(all(feature = "stdout", not(any(feature = "otel", feature = "metrics"))))]
compile_error!("The 'stdout' feature requires at least one of 'otel' or 'metrics' to be enabled.");

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(any(feature = "metrics", feature = "otel"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "otel"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "otel"))]
use opentelemetry_semantic_conventions as semvcns;

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(feature = "otel")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "otel")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "otel")]
use opentelemetry_sdk::trace as sdktrace;

const SERVICE_NAME: &str = "tidings";

/// Handles to the exporters, flushed and shut down on exit.
#[derive(Default)]
pub struct TelemetryProviders {
    #[cfg(feature = "otel")]
    pub tracer_provider: Option<sdktrace::SdkTracerProvider>,
    #[cfg(feature = "metrics")]
    pub meter_provider: Option<sdkmetrics::SdkMeterProvider>,
}

impl TelemetryProviders {
    /// Flushes pending spans and metrics and stops the exporters.
    pub fn shutdown(self) {
        #[cfg(feature = "otel")]
        if let Some(provider) = self.tracer_provider {
            if let Err(err) = provider.force_flush() {
                eprintln!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }

        #[cfg(feature = "metrics")]
        if let Some(provider) = self.meter_provider {
            if let Err(err) = provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

/// Installs the global subscriber and, when enabled, the exporters.
///
/// # Errors
///
/// Fails if an exporter cannot be built or a global subscriber is already
/// installed.
pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "otel")]
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    #[cfg(feature = "otel")]
    let tracer_provider = init_tracer()?;

    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics()?;

    #[cfg(any(feature = "metrics", feature = "otel"))]
    let scope = InstrumentationScope::builder(SERVICE_NAME)
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true),
        );

    #[cfg(feature = "otel")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let meter = opentelemetry::global::meter_with_scope(scope);
        init_metric_handles(meter);

        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.try_init()?;

    Ok(TelemetryProviders {
        #[cfg(feature = "otel")]
        tracer_provider: Some(tracer_provider),
        #[cfg(feature = "metrics")]
        meter_provider: Some(meter_provider),
    })
}

#[cfg(any(feature = "metrics", feature = "otel"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "otel")]
fn init_tracer() -> anyhow::Result<sdktrace::SdkTracerProvider> {
    #[allow(unused_mut)]
    let mut builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    {
        let exporter = opentelemetry_stdout::SpanExporter::default();
        builder = builder.with_span_processor(batch_processor(exporter));
    }

    #[cfg(feature = "otlp")]
    {
        use anyhow::Context;
        use opentelemetry_otlp::{Compression, WithExportConfig, WithTonicConfig};

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_compression(Compression::Gzip)
            .with_timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build span exporter")?;
        builder = builder.with_span_processor(batch_processor(exporter));
    }

    Ok(builder.build())
}

#[cfg(feature = "otel")]
#[allow(dead_code)]
fn batch_processor<E>(exporter: E) -> sdktrace::BatchSpanProcessor
where
    E: opentelemetry_sdk::trace::SpanExporter + Send + 'static,
{
    sdktrace::BatchSpanProcessor::builder(exporter)
        .with_batch_config(
            sdktrace::BatchConfigBuilder::default()
                .with_scheduled_delay(std::time::Duration::from_secs(5))
                .with_max_queue_size(2048)
                .build(),
        )
        .build()
}

#[cfg(feature = "metrics")]
fn init_metrics() -> anyhow::Result<sdkmetrics::SdkMeterProvider> {
    #[allow(unused_mut)]
    let mut builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    {
        let exporter = opentelemetry_stdout::MetricExporter::default();
        let reader = sdkmetrics::PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(5))
            .build();
        builder = builder.with_reader(reader);
    }

    #[cfg(feature = "otlp")]
    {
        use anyhow::Context;
        use opentelemetry_otlp::{Compression, WithExportConfig, WithTonicConfig};

        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_compression(Compression::Gzip)
            .with_timeout(std::time::Duration::from_secs(10))
            .with_temporality(sdkmetrics::Temporality::Delta)
            .build()
            .context("failed to build metrics exporter")?;
        builder = builder.with_periodic_exporter(exporter);
    }

    Ok(builder.build())
}

#[cfg(feature = "metrics")]
static REQUESTS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static STREAMS_INFLIGHT: OnceLock<UpDownCounter<i64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static STREAM_ERRORS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static AUTH_FAILURES: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static MESSAGES_SENT: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static STREAM_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: Meter) {
    let _ = REQUESTS.set(
        meter
            .u64_counter("requests")
            .with_description("Streaming calls admitted to the worker pool")
            .build(),
    );
    let _ = STREAMS_INFLIGHT.set(
        meter
            .i64_up_down_counter("streams_inflight")
            .with_description("Calls currently streaming")
            .build(),
    );
    let _ = STREAM_ERRORS.set(
        meter
            .u64_counter("errors")
            .with_description("Refused, cancelled or aborted streams")
            .build(),
    );
    let _ = AUTH_FAILURES.set(
        meter
            .u64_counter("auth_failures")
            .with_description("Calls rejected as unauthenticated")
            .build(),
    );
    let _ = MESSAGES_SENT.set(
        meter
            .u64_counter("messages_sent")
            .with_description("Greetings handed to the transport")
            .build(),
    );
    let _ = STREAM_DURATION_MS.set(
        meter
            .f64_histogram("stream_duration")
            .with_unit("ms")
            .with_description("End-to-end stream duration")
            .build(),
    );
}

#[cfg(feature = "metrics")]
fn add(counter: &OnceLock<Counter<u64>>, value: u64) {
    if let Some(counter) = counter.get() {
        counter.add(value, &[]);
    }
}

#[cfg(feature = "metrics")]
pub fn increment_requests() {
    add(&REQUESTS, 1);
}

#[cfg(not(feature = "metrics"))]
pub fn increment_requests() {}

#[cfg(feature = "metrics")]
pub fn increment_streams_inflight() {
    if let Some(counter) = STREAMS_INFLIGHT.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_streams_inflight() {}

#[cfg(feature = "metrics")]
pub fn decrement_streams_inflight() {
    if let Some(counter) = STREAMS_INFLIGHT.get() {
        counter.add(-1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn decrement_streams_inflight() {}

#[cfg(feature = "metrics")]
pub fn increment_stream_errors() {
    add(&STREAM_ERRORS, 1);
}

#[cfg(not(feature = "metrics"))]
pub fn increment_stream_errors() {}

#[cfg(feature = "metrics")]
pub fn increment_auth_failures() {
    add(&AUTH_FAILURES, 1);
}

#[cfg(not(feature = "metrics"))]
pub fn increment_auth_failures() {}

#[cfg(feature = "metrics")]
pub fn increment_messages_sent() {
    add(&MESSAGES_SENT, 1);
}

#[cfg(not(feature = "metrics"))]
pub fn increment_messages_sent() {}

#[cfg(feature = "metrics")]
pub fn record_stream_duration(duration_ms: f64) {
    if let Some(histogram) = STREAM_DURATION_MS.get() {
        histogram.record(duration_ms, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_stream_duration(_duration_ms: f64) {}
