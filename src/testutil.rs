use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::metrics::{GaugeCallback, Labels, Metric, MetricsSink, OUTCOME_LABEL};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedDuration {
    pub name: &'static str,
    pub elapsed: Duration,
    pub outcome: Option<String>,
}

type SeriesKey = (&'static str, Vec<(String, String)>);

#[derive(Default)]
struct Recorded {
    counters: HashMap<SeriesKey, u64>,
    counter_registrations: HashMap<SeriesKey, usize>,
    gauges: HashMap<&'static str, GaugeCallback>,
    durations: Vec<RecordedDuration>,
    reports: usize,
}

/// Sink capturing everything reported to it, for assertions in tests.
#[derive(Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of the counter series `name{label=value}`, if it exists.
    pub fn counter(&self, name: &str, label: &'static str, value: &str) -> Option<u64> {
        let key = series_key_lookup(label, value);
        self.with(|rec| {
            rec.counters
                .iter()
                .find(|((n, labels), _)| *n == name && *labels == key)
                .map(|(_, count)| *count)
        })
    }

    /// How many times the series was registered.
    pub fn counter_registrations(&self, name: &str, label: &'static str, value: &str) -> usize {
        let key = series_key_lookup(label, value);
        self.with(|rec| {
            rec.counter_registrations
                .iter()
                .filter(|((n, labels), _)| *n == name && *labels == key)
                .map(|(_, count)| *count)
                .sum()
        })
    }

    pub fn counter_series(&self, name: &str) -> usize {
        self.with(|rec| rec.counters.keys().filter(|(n, _)| *n == name).count())
    }

    /// Reads the registered gauge through its callback, as an exporter would.
    pub fn gauge(&self, name: &str) -> Option<u64> {
        let callback = self.with(|rec| rec.gauges.get(name).cloned())?;
        Some(callback())
    }

    pub fn durations(&self, name: &str) -> Vec<RecordedDuration> {
        self.with(|rec| {
            rec.durations
                .iter()
                .filter(|sample| sample.name == name)
                .cloned()
                .collect()
        })
    }

    pub fn reports(&self) -> usize {
        self.with(|rec| rec.reports)
    }

    fn with<R>(&self, f: impl FnOnce(&mut Recorded) -> R) -> R {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }
}

fn series_key(labels: Labels<'_>) -> Vec<(String, String)> {
    labels
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn series_key_lookup(label: &str, value: &str) -> Vec<(String, String)> {
    vec![(label.to_string(), value.to_string())]
}

impl MetricsSink for RecordingSink {
    fn register_counter(&self, metric: &Metric, labels: Labels<'_>) {
        let key = (metric.name, series_key(labels));
        self.with(|rec| {
            *rec.counter_registrations.entry(key.clone()).or_default() += 1;
            rec.counters.entry(key).or_insert(0);
        });
    }

    fn increment_counter(&self, metric: &Metric, labels: Labels<'_>) {
        let key = (metric.name, series_key(labels));
        self.with(|rec| *rec.counters.entry(key).or_insert(0) += 1);
    }

    fn register_gauge(&self, metric: &Metric, callback: GaugeCallback) {
        self.with(|rec| {
            rec.gauges.insert(metric.name, callback);
        });
    }

    fn record_duration(&self, metric: &Metric, elapsed: Duration, labels: Labels<'_>) {
        let outcome = labels
            .iter()
            .find(|(k, _)| *k == OUTCOME_LABEL)
            .map(|(_, v)| (*v).to_string());
        self.with(|rec| {
            rec.durations.push(RecordedDuration {
                name: metric.name,
                elapsed,
                outcome,
            })
        });
    }

    fn report(&self) {
        self.with(|rec| rec.reports += 1);
    }
}
