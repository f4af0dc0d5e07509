use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::Level;

use crate::metrics::{GaugeCallback, Labels, Metric, MetricsSink};

type SeriesKey = (&'static str, Vec<(&'static str, String)>);

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TimerStats {
    pub count: u64,
    pub total_seconds: f64,
    pub max_seconds: f64,
}

impl TimerStats {
    fn record(&mut self, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        self.count += 1;
        self.total_seconds += secs;
        if secs > self.max_seconds {
            self.max_seconds = secs;
        }
    }
}

#[derive(Default)]
struct Aggregates {
    counters: BTreeMap<SeriesKey, u64>,
    timers: BTreeMap<SeriesKey, TimerStats>,
    gauges: BTreeMap<&'static str, GaugeCallback>,
}

/// Aggregates in-process and emits one JSON `tracing` event per series on
/// [`MetricsSink::report`].
#[derive(Default)]
pub struct JsonLogSink {
    inner: Mutex<Aggregates>,
}

impl JsonLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of every series as JSON payloads.
    pub fn snapshot(&self) -> Vec<Value> {
        let (counters, timers, gauges) = {
            let guard = self.lock();
            (
                guard.counters.clone(),
                guard.timers.clone(),
                guard
                    .gauges
                    .iter()
                    .map(|(name, callback)| (*name, callback.clone()))
                    .collect::<Vec<_>>(),
            )
        };

        let mut payloads = Vec::new();
        for ((name, labels), value) in counters {
            payloads.push(json!({
                "metric": name,
                "kind": "counter",
                "value": value,
                "attributes": attributes(&labels),
            }));
        }
        // Gauge callbacks may take other locks; they run after ours is released.
        for (name, callback) in gauges {
            payloads.push(json!({
                "metric": name,
                "kind": "gauge",
                "value": callback(),
                "attributes": {},
            }));
        }
        for ((name, labels), stats) in timers {
            payloads.push(json!({
                "metric": name,
                "kind": "timer",
                "value": stats,
                "attributes": attributes(&labels),
            }));
        }
        payloads
    }

    fn lock(&self) -> MutexGuard<'_, Aggregates> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn series_key(metric: &Metric, labels: Labels<'_>) -> SeriesKey {
    (
        metric.name,
        labels.iter().map(|(k, v)| (*k, (*v).to_string())).collect(),
    )
}

fn attributes(labels: &[(&'static str, String)]) -> Map<String, Value> {
    labels
        .iter()
        .map(|(k, v)| ((*k).to_string(), Value::String(v.clone())))
        .collect()
}

impl MetricsSink for JsonLogSink {
    fn register_counter(&self, metric: &Metric, labels: Labels<'_>) {
        self.lock()
            .counters
            .entry(series_key(metric, labels))
            .or_insert(0);
    }

    fn increment_counter(&self, metric: &Metric, labels: Labels<'_>) {
        *self
            .lock()
            .counters
            .entry(series_key(metric, labels))
            .or_insert(0) += 1;
    }

    fn register_gauge(&self, metric: &Metric, callback: GaugeCallback) {
        self.lock().gauges.insert(metric.name, callback);
    }

    fn record_duration(&self, metric: &Metric, elapsed: Duration, labels: Labels<'_>) {
        self.lock()
            .timers
            .entry(series_key(metric, labels))
            .or_default()
            .record(elapsed);
    }

    fn report(&self) {
        for payload in self.snapshot() {
            let name = payload["metric"].as_str().unwrap_or_default().to_string();
            tracing::event!(
                target: "order_queue.metric",
                Level::INFO,
                metric_name = %name,
                payload = %payload
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{ORDER_SERVICE_DURATION, ORDERS, ORDERS_IN_QUEUE};
    use std::sync::Arc;

    #[test]
    fn counters_register_once_and_accumulate() {
        let sink = JsonLogSink::new();
        sink.register_counter(&ORDERS, &[("type", "ale")]);
        sink.register_counter(&ORDERS, &[("type", "ale")]);
        sink.increment_counter(&ORDERS, &[("type", "ale")]);
        sink.increment_counter(&ORDERS, &[("type", "ale")]);

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0]["value"], 2);
        assert_eq!(snapshot[0]["attributes"]["type"], "ale");
    }

    #[test]
    fn gauges_are_read_at_snapshot_time() {
        let sink = JsonLogSink::new();
        let level = Arc::new(std::sync::atomic::AtomicU64::new(4));
        let observed = Arc::clone(&level);
        sink.register_gauge(
            &ORDERS_IN_QUEUE,
            Arc::new(move || observed.load(std::sync::atomic::Ordering::Relaxed)),
        );

        assert_eq!(sink.snapshot()[0]["value"], 4);
        level.store(1, std::sync::atomic::Ordering::Relaxed);
        assert_eq!(sink.snapshot()[0]["value"], 1);
    }

    #[test]
    fn timers_track_count_total_and_max() {
        let sink = JsonLogSink::new();
        let labels = [("outcome", "success")];
        sink.record_duration(&ORDER_SERVICE_DURATION, Duration::from_millis(500), &labels);
        sink.record_duration(&ORDER_SERVICE_DURATION, Duration::from_millis(1500), &labels);

        let snapshot = sink.snapshot();
        let stats = &snapshot[0]["value"];
        assert_eq!(stats["count"], 2);
        assert_eq!(stats["total_seconds"], 2.0);
        assert_eq!(stats["max_seconds"], 1.5);
    }
}
