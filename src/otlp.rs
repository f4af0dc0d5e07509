use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use opentelemetry::metrics::{Counter, Histogram, Meter, MeterProvider as _, ObservableGauge};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{KeyValue, global};
use opentelemetry_otlp::{MetricExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};

use crate::metrics::{GaugeCallback, Labels, Metric, MetricsSink};

pub const METER_NAME: &str = "order-queue";

static TRACER_PROVIDER: OnceCell<SdkTracerProvider> = OnceCell::new();
static METER_PROVIDER: OnceCell<SdkMeterProvider> = OnceCell::new();

/// OTLP pipeline configuration.
#[derive(Debug, Clone)]
pub struct OtlpConfig {
    pub endpoint: String,
    pub service_name: String,
}

/// Builds OTLP span and metric exporters, installs them as the global
/// providers and returns the tracer for the `tracing` bridge.
pub fn init_otlp(cfg: &OtlpConfig) -> Result<SdkTracer> {
    let resource = Resource::builder_empty()
        .with_attributes([KeyValue::new("service.name", cfg.service_name.clone())])
        .build();

    let span_exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(cfg.endpoint.clone())
        .with_timeout(Duration::from_secs(3))
        .build()
        .context("building OTLP span exporter")?;
    let tracer_provider = SdkTracerProvider::builder()
        .with_resource(resource.clone())
        .with_batch_exporter(span_exporter)
        .build();
    let tracer = tracer_provider.tracer(METER_NAME);

    let metric_exporter = MetricExporter::builder()
        .with_tonic()
        .with_endpoint(cfg.endpoint.clone())
        .with_timeout(Duration::from_secs(3))
        .build()
        .context("building OTLP metric exporter")?;
    let meter_provider = SdkMeterProvider::builder()
        .with_resource(resource)
        .with_periodic_exporter(metric_exporter)
        .build();

    if TRACER_PROVIDER.set(tracer_provider.clone()).is_err() {
        tracing::warn!("otlp tracer provider already initialized; skipping overwrite");
    }
    if METER_PROVIDER.set(meter_provider.clone()).is_err() {
        tracing::warn!("otlp meter provider already initialized; skipping overwrite");
    }
    global::set_tracer_provider(tracer_provider);
    global::set_meter_provider(meter_provider);

    Ok(tracer)
}

/// Flushes and stops any installed OTLP providers.
pub fn shutdown() {
    if let Some(provider) = METER_PROVIDER.get() {
        if let Err(err) = provider.shutdown() {
            tracing::warn!("meter provider shutdown failed: {err}");
        }
    }
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(err) = provider.shutdown() {
            tracing::warn!("tracer provider shutdown failed: {err}");
        }
    }
}

/// [`MetricsSink`] backed by OpenTelemetry instruments.
///
/// Instruments are cached by name; a second registration reuses the first.
pub struct OtelSink {
    meter: Meter,
    counters: Mutex<HashMap<&'static str, Counter<u64>>>,
    histograms: Mutex<HashMap<&'static str, Histogram<f64>>>,
    gauges: Mutex<HashMap<&'static str, ObservableGauge<u64>>>,
}

impl OtelSink {
    pub fn new(meter: Meter) -> Self {
        Self {
            meter,
            counters: Mutex::new(HashMap::new()),
            histograms: Mutex::new(HashMap::new()),
            gauges: Mutex::new(HashMap::new()),
        }
    }

    /// Sink using the globally installed meter provider.
    pub fn global() -> Self {
        Self::new(global::meter(METER_NAME))
    }

    pub fn from_provider(provider: &SdkMeterProvider) -> Self {
        Self::new(provider.meter(METER_NAME))
    }

    fn counter(&self, metric: &Metric) -> Counter<u64> {
        lock(&self.counters)
            .entry(metric.name)
            .or_insert_with(|| {
                self.meter
                    .u64_counter(metric.name)
                    .with_description(metric.description)
                    .build()
            })
            .clone()
    }

    fn histogram(&self, metric: &Metric) -> Histogram<f64> {
        lock(&self.histograms)
            .entry(metric.name)
            .or_insert_with(|| {
                self.meter
                    .f64_histogram(metric.name)
                    .with_description(metric.description)
                    .with_unit("s")
                    .build()
            })
            .clone()
    }

    pub fn instrument_count(&self) -> usize {
        lock(&self.counters).len() + lock(&self.histograms).len() + lock(&self.gauges).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn attributes(labels: Labels<'_>) -> Vec<KeyValue> {
    labels
        .iter()
        .map(|(k, v)| KeyValue::new(*k, (*v).to_string()))
        .collect()
}

impl MetricsSink for OtelSink {
    fn register_counter(&self, metric: &Metric, labels: Labels<'_>) {
        self.counter(metric).add(0, &attributes(labels));
    }

    fn increment_counter(&self, metric: &Metric, labels: Labels<'_>) {
        self.counter(metric).add(1, &attributes(labels));
    }

    fn register_gauge(&self, metric: &Metric, callback: GaugeCallback) {
        let mut gauges = lock(&self.gauges);
        if gauges.contains_key(metric.name) {
            tracing::debug!(metric = metric.name, "gauge already registered");
            return;
        }
        let gauge = self
            .meter
            .u64_observable_gauge(metric.name)
            .with_description(metric.description)
            .with_callback(move |observer| observer.observe(callback(), &[]))
            .build();
        gauges.insert(metric.name, gauge);
    }

    fn record_duration(&self, metric: &Metric, elapsed: Duration, labels: Labels<'_>) {
        self.histogram(metric)
            .record(elapsed.as_secs_f64(), &attributes(labels));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{ORDER_SERVICE_DURATION, ORDERS, ORDERS_IN_QUEUE};
    use std::sync::Arc;

    #[test]
    fn instruments_are_cached_by_name() {
        let provider = SdkMeterProvider::builder().build();
        let sink = OtelSink::from_provider(&provider);

        sink.register_counter(&ORDERS, &[("type", "ale")]);
        sink.increment_counter(&ORDERS, &[("type", "ale")]);
        sink.increment_counter(&ORDERS, &[("type", "light")]);
        sink.record_duration(
            &ORDER_SERVICE_DURATION,
            Duration::from_millis(10),
            &[("outcome", "success")],
        );
        sink.register_gauge(&ORDERS_IN_QUEUE, Arc::new(|| 3));
        sink.register_gauge(&ORDERS_IN_QUEUE, Arc::new(|| 4));

        assert_eq!(sink.instrument_count(), 3);
    }
}
