//! Logging, span export and metrics.
//!
//! Log output is always on: a `tracing` subscriber with a pretty `fmt` layer,
//! filtered by `RUST_LOG` (default `info`). OpenTelemetry export is opt-in:
//!
//! | Feature     | Effect                                             |
//! | ----------- | -------------------------------------------------- |
//! | `tracing`   | export spans (events inside a span become events)  |
//! | `metrics`   | export the instruments below; otherwise no-ops     |
//! | `stdout`    | print exported data to stdout                      |
//! | `honeycomb` | send exported data to Honeycomb over OTLP/gRPC     |
//!
//! An exporter needs `tracing` or `metrics` to have something to export.
//!
//! ```bash
//! cargo run --bin cuckoo-server --features tracing,metrics,honeycomb
//! ```
//!
//! ## Instruments
//!
//! - `requests` (counter, `method` attribute)
//! - `streams_inflight` (up/down counter)
//! - `stream_errors`, `stream_matches` (counters)
//! - `stream_duration` (histogram, ms)
//! - `dumps`, `dump_failures`, `dump_ticks_skipped` (counters)
//! - `dump_duration` (histogram, ms)

#[cfg(all(
    any(feature = "honeycomb", feature = "stdout"),
    not(any(feature = "tracing", feature = "metrics"))
))]
compile_error!("Exporter features require at least one of 'tracing' or 'metrics'.");

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(any(feature = "metrics", feature = "tracing"))]
use core::time::Duration;
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_semantic_conventions as semconv;

#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics::SdkMeterProvider;
#[cfg(feature = "tracing")]
use opentelemetry_sdk::trace::SdkTracerProvider;

#[cfg(any(feature = "metrics", feature = "tracing"))]
const SERVICE_NAME: &str = "cuckoo-registry";

#[cfg(any(feature = "metrics", feature = "tracing"))]
const EXPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Handles to the OpenTelemetry providers, flushed on shutdown.
#[derive(Default)]
pub struct TelemetryProviders {
    #[cfg(feature = "tracing")]
    tracer: Option<SdkTracerProvider>,
    #[cfg(feature = "metrics")]
    meter: Option<SdkMeterProvider>,
}

impl TelemetryProviders {
    /// Flushes pending spans and metrics, then shuts the providers down.
    ///
    /// Errors go to stderr; the subscriber may no longer deliver them.
    pub fn shutdown(self) {
        #[cfg(feature = "tracing")]
        if let Some(tracer) = self.tracer {
            if let Err(e) = tracer.force_flush().and_then(|()| tracer.shutdown()) {
                eprintln!("Failed to flush spans: {e:?}");
            }
        }

        #[cfg(feature = "metrics")]
        if let Some(meter) = self.meter {
            if let Err(e) = meter.force_flush().and_then(|()| meter.shutdown()) {
                eprintln!("Failed to flush metrics: {e:?}");
            }
        }
    }
}

/// Installs the global subscriber and the enabled OpenTelemetry providers.
///
/// # Errors
///
/// Fails when an exporter cannot be configured, e.g. a missing Honeycomb
/// variable.
pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[allow(unused_mut)]
    let mut providers = TelemetryProviders::default();

    let fmt = tracing_subscriber::fmt::layer()
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .pretty();

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt);

    #[cfg(any(feature = "metrics", feature = "tracing"))]
    let scope = InstrumentationScope::builder(SERVICE_NAME)
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semconv::SCHEMA_URL)
        .build();

    #[cfg(feature = "tracing")]
    let subscriber = {
        use opentelemetry::trace::TracerProvider as _;

        opentelemetry::global::set_text_map_propagator(
            opentelemetry_sdk::propagation::TraceContextPropagator::new(),
        );
        let tracer = export::tracer_provider()?;
        opentelemetry::global::set_tracer_provider(tracer.clone());
        let layer = tracing_opentelemetry::layer()
            .with_tracer(tracer.tracer_with_scope(scope.clone()))
            .with_error_records_to_exceptions(true);
        providers.tracer = Some(tracer);
        subscriber.with(layer)
    };

    #[cfg(feature = "metrics")]
    let subscriber = {
        let meter = export::meter_provider()?;
        opentelemetry::global::set_meter_provider(meter.clone());
        instruments::install(&opentelemetry::global::meter_with_scope(scope));
        let layer = tracing_opentelemetry::MetricsLayer::new(meter.clone());
        providers.meter = Some(meter);
        subscriber.with(layer)
    };

    subscriber.init();
    Ok(providers)
}

#[cfg(any(feature = "metrics", feature = "tracing"))]
mod export {
    use super::{EXPORT_INTERVAL, KeyValue, SERVICE_NAME, semconv};
    use opentelemetry_sdk::Resource;

    fn resource() -> Resource {
        Resource::builder()
            .with_service_name(SERVICE_NAME)
            .with_schema_url(
                [KeyValue::new(
                    semconv::resource::SERVICE_VERSION,
                    env!("CARGO_PKG_VERSION"),
                )],
                semconv::SCHEMA_URL,
            )
            .build()
    }

    #[cfg(feature = "tracing")]
    pub(super) fn tracer_provider() -> anyhow::Result<super::SdkTracerProvider> {
        use opentelemetry_sdk::trace::{BatchConfigBuilder, BatchSpanProcessor, SpanExporter};

        fn batched(exporter: impl SpanExporter + 'static) -> BatchSpanProcessor {
            let config = BatchConfigBuilder::default()
                .with_scheduled_delay(EXPORT_INTERVAL)
                .with_max_queue_size(2048)
                .build();
            BatchSpanProcessor::builder(exporter)
                .with_batch_config(config)
                .build()
        }

        let builder = super::SdkTracerProvider::builder().with_resource(resource());

        #[cfg(feature = "stdout")]
        let builder =
            builder.with_span_processor(batched(opentelemetry_stdout::SpanExporter::default()));

        #[cfg(feature = "honeycomb")]
        let builder = builder.with_span_processor(batched(honeycomb::span_exporter()?));

        Ok(builder.build())
    }

    #[cfg(feature = "metrics")]
    pub(super) fn meter_provider() -> anyhow::Result<super::SdkMeterProvider> {
        let builder = super::SdkMeterProvider::builder().with_resource(resource());

        #[cfg(feature = "stdout")]
        let builder = builder.with_reader(
            opentelemetry_sdk::metrics::PeriodicReader::builder(
                opentelemetry_stdout::MetricExporter::default(),
            )
            .with_interval(EXPORT_INTERVAL)
            .build(),
        );

        #[cfg(feature = "honeycomb")]
        let builder = builder.with_periodic_exporter(honeycomb::metric_exporter()?);

        Ok(builder.build())
    }

    /// OTLP/gRPC exporters pointed at Honeycomb.
    ///
    /// Reads `HONEYCOMB_API_KEY`, `HONEYCOMB_DATASET`, `HONEYCOMB_ENDPOINT`
    /// and `HONEYCOMB_COMPRESSION` (`gzip` or `zstd`).
    #[cfg(feature = "honeycomb")]
    mod honeycomb {
        use anyhow::Context;
        use core::{str::FromStr, time::Duration};
        use opentelemetry_otlp::{Compression, Protocol, WithExportConfig, WithTonicConfig};
        use tonic::{metadata::MetadataMap, transport::ClientTlsConfig};

        const TIMEOUT: Duration = Duration::from_secs(10);

        fn env(key: &str) -> anyhow::Result<String> {
            std::env::var(key).with_context(|| format!("`{key}` is not set"))
        }

        /// Applies the shared connection settings to an exporter builder.
        fn configure<B>(builder: B) -> anyhow::Result<B>
        where
            B: WithTonicConfig + WithExportConfig,
        {
            let mut metadata = MetadataMap::new();
            metadata.insert(
                "x-honeycomb-team",
                env("HONEYCOMB_API_KEY")?
                    .parse()
                    .context("`HONEYCOMB_API_KEY` is not a valid header value")?,
            );
            metadata.insert(
                "x-honeycomb-dataset",
                env("HONEYCOMB_DATASET")?
                    .parse()
                    .context("`HONEYCOMB_DATASET` is not a valid header value")?,
            );
            let compression =
                Compression::from_str(&env("HONEYCOMB_COMPRESSION")?.to_ascii_lowercase())?;

            Ok(builder
                .with_tls_config(ClientTlsConfig::new().with_native_roots())
                .with_metadata(metadata)
                .with_compression(compression)
                .with_timeout(TIMEOUT)
                .with_endpoint(env("HONEYCOMB_ENDPOINT")?)
                .with_protocol(Protocol::Grpc))
        }

        #[cfg(feature = "tracing")]
        pub(super) fn span_exporter() -> anyhow::Result<opentelemetry_otlp::SpanExporter> {
            configure(opentelemetry_otlp::SpanExporter::builder().with_tonic())?
                .build()
                .context("failed to build span exporter")
        }

        #[cfg(feature = "metrics")]
        pub(super) fn metric_exporter() -> anyhow::Result<opentelemetry_otlp::MetricExporter> {
            configure(opentelemetry_otlp::MetricExporter::builder().with_tonic())?
                .with_temporality(opentelemetry_sdk::metrics::Temporality::Delta)
                .build()
                .context("failed to build metric exporter")
        }
    }
}

#[cfg(feature = "metrics")]
mod instruments {
    use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
    use std::sync::OnceLock;

    pub(super) struct Instruments {
        pub requests: Counter<u64>,
        pub streams_inflight: UpDownCounter<i64>,
        pub stream_errors: Counter<u64>,
        pub stream_matches: Counter<u64>,
        pub stream_duration_ms: Histogram<f64>,
        pub dumps: Counter<u64>,
        pub dump_failures: Counter<u64>,
        pub dump_ticks_skipped: Counter<u64>,
        pub dump_duration_ms: Histogram<f64>,
    }

    static INSTRUMENTS: OnceLock<Instruments> = OnceLock::new();

    pub(super) fn install(meter: &Meter) {
        let counter = |name: &'static str, description: &'static str| {
            meter.u64_counter(name).with_description(description).build()
        };
        let millis = |name: &'static str, description: &'static str| {
            meter
                .f64_histogram(name)
                .with_unit("ms")
                .with_description(description)
                .build()
        };

        let _ = INSTRUMENTS.set(Instruments {
            requests: counter("requests", "gRPC requests, by method"),
            streams_inflight: meter
                .i64_up_down_counter("streams_inflight")
                .with_description("Open streaming lookup sessions")
                .build(),
            stream_errors: counter("stream_errors", "Streaming sessions that ended in error"),
            stream_matches: counter("stream_matches", "Matches sent by streaming lookups"),
            stream_duration_ms: millis("stream_duration", "Streaming session wall time"),
            dumps: counter("dumps", "Completed snapshot dumps"),
            dump_failures: counter("dump_failures", "Failed snapshot dumps"),
            dump_ticks_skipped: counter(
                "dump_ticks_skipped",
                "Dump ticks dropped while a dump was running",
            ),
            dump_duration_ms: millis("dump_duration", "Snapshot dump wall time"),
        });
    }

    /// Runs `f` once the instruments are installed; a no-op before that.
    pub(super) fn with(f: impl FnOnce(&Instruments)) {
        if let Some(instruments) = INSTRUMENTS.get() {
            f(instruments);
        }
    }
}

// Without the `metrics` feature every recorder below compiles to nothing.

#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub fn increment_requests(method: &'static str) {
    #[cfg(feature = "metrics")]
    instruments::with(|m| m.requests.add(1, &[KeyValue::new("method", method)]));
}

pub fn increment_streams_inflight() {
    #[cfg(feature = "metrics")]
    instruments::with(|m| m.streams_inflight.add(1, &[]));
}

pub fn decrement_streams_inflight() {
    #[cfg(feature = "metrics")]
    instruments::with(|m| m.streams_inflight.add(-1, &[]));
}

pub fn increment_stream_errors() {
    #[cfg(feature = "metrics")]
    instruments::with(|m| m.stream_errors.add(1, &[]));
}

#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub fn increment_stream_matches(count: u64) {
    #[cfg(feature = "metrics")]
    instruments::with(|m| m.stream_matches.add(count, &[]));
}

#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub fn record_stream_duration(duration_ms: f64) {
    #[cfg(feature = "metrics")]
    instruments::with(|m| m.stream_duration_ms.record(duration_ms, &[]));
}

pub fn increment_dumps() {
    #[cfg(feature = "metrics")]
    instruments::with(|m| m.dumps.add(1, &[]));
}

pub fn increment_dump_failures() {
    #[cfg(feature = "metrics")]
    instruments::with(|m| m.dump_failures.add(1, &[]));
}

pub fn increment_dump_ticks_skipped() {
    #[cfg(feature = "metrics")]
    instruments::with(|m| m.dump_ticks_skipped.add(1, &[]));
}

#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub fn record_dump_duration(duration_ms: f64) {
    #[cfg(feature = "metrics")]
    instruments::with(|m| m.dump_duration_ms.record(duration_ms, &[]));
}
