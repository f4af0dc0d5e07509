use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::OnceCell;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

use crate::export::{ExportMode, LogFormat, TelemetryConfig};
use crate::json_sink::JsonLogSink;
use crate::metrics::MetricsSink;

static INITED: OnceCell<()> = OnceCell::new();

/// Installs the global `tracing` subscriber and picks the metrics sink for
/// the configured export mode.
///
/// The subscriber is installed at most once per process; later calls only
/// build a fresh sink.
pub fn init_telemetry(cfg: &TelemetryConfig) -> Result<Arc<dyn MetricsSink>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match cfg.log_format {
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .pretty()
            .with_ansi(atty::is(atty::Stream::Stdout))
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
    };

    match cfg.mode {
        ExportMode::JsonStdout => {
            if INITED.get().is_none() {
                let _ = tracing_subscriber::registry()
                    .with(fmt_layer)
                    .with(filter)
                    .try_init();
                let _ = INITED.set(());
            }
            Ok(Arc::new(JsonLogSink::new()))
        }
        ExportMode::OtlpGrpc => init_otlp_mode(cfg, fmt_layer, filter),
    }
}

#[cfg(feature = "otlp")]
fn init_otlp_mode(
    cfg: &TelemetryConfig,
    fmt_layer: Box<dyn Layer<Registry> + Send + Sync>,
    filter: EnvFilter,
) -> Result<Arc<dyn MetricsSink>> {
    use crate::otlp::{OtelSink, OtlpConfig, init_otlp};

    if INITED.get().is_none() {
        let tracer = init_otlp(&OtlpConfig {
            endpoint: cfg.endpoint.clone(),
            service_name: cfg.service_name.clone(),
        })?;
        let _ = tracing_subscriber::registry()
            .with(fmt_layer)
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .with(filter)
            .try_init();
        let _ = INITED.set(());
        tracing::info!(endpoint = %cfg.endpoint, service = %cfg.service_name, "otlp export enabled");
    }
    Ok(Arc::new(OtelSink::global()))
}

#[cfg(not(feature = "otlp"))]
fn init_otlp_mode(
    _cfg: &TelemetryConfig,
    _fmt_layer: Box<dyn Layer<Registry> + Send + Sync>,
    _filter: EnvFilter,
) -> Result<Arc<dyn MetricsSink>> {
    Err(anyhow::anyhow!(
        "TELEMETRY_EXPORT=otlp-grpc requires the `otlp` feature"
    ))
}

/// Flushes exporters installed by [`init_telemetry`].
pub fn shutdown() {
    #[cfg(feature = "otlp")]
    crate::otlp::shutdown();
}
