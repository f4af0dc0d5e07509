pub mod config;
pub mod error;
pub mod export;
pub mod init;
pub mod json_sink;
pub mod metrics;
pub mod order;
#[cfg(feature = "otlp")]
pub mod otlp;
pub mod runtime;
pub mod service;
pub mod testutil;

pub use config::ServiceConfig;
pub use error::QueueError;
pub use export::{ExportMode, LogFormat, TelemetryConfig};
pub use init::{init_telemetry, shutdown};
pub use json_sink::JsonLogSink;
pub use metrics::{GaugeCallback, Metric, MetricsSink, timed};
pub use order::{Order, OrderGenerator};
#[cfg(feature = "otlp")]
pub use otlp::{OtelSink, OtlpConfig};
pub use service::{CountPolicy, DrainOutcome, OrderQueueService, QueueOptions};
