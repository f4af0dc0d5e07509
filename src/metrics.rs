use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::QueueError;

/// Name and help text of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Metric {
    pub name: &'static str,
    pub description: &'static str,
}

pub const ORDERS: Metric = Metric {
    name: "orders",
    description: "The number of orders ever placed",
};

pub const ORDERS_IN_QUEUE: Metric = Metric {
    name: "ordersInQueue",
    description: "Number of unserved orders",
};

pub const ORDER_SERVICE_DURATION: Metric = Metric {
    name: "orderServiceDuration",
    description: "Time spent serving orders",
};

pub const ORDER_SERVICE_ACTIVE: Metric = Metric {
    name: "orderServiceDuration.active",
    description: "Orders currently being served",
};

pub const CATEGORY_LABEL: &str = "type";
pub const OUTCOME_LABEL: &str = "outcome";
pub const OUTCOME_SUCCESS: &str = "success";
pub const OUTCOME_INTERRUPTED: &str = "interrupted";

pub type Labels<'a> = &'a [(&'static str, &'a str)];

/// Pull-based observation read by the sink on its own schedule.
pub type GaugeCallback = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Destination for everything the order queue reports.
///
/// Implementations own aggregation and export; callers never format metric
/// data themselves.
pub trait MetricsSink: Send + Sync {
    /// Make a labeled counter series exist at zero. Must be idempotent.
    fn register_counter(&self, _metric: &Metric, _labels: Labels<'_>) {}

    fn increment_counter(&self, metric: &Metric, labels: Labels<'_>);

    fn register_gauge(&self, metric: &Metric, callback: GaugeCallback);

    fn record_duration(&self, metric: &Metric, elapsed: Duration, labels: Labels<'_>);

    /// Push aggregated state out, for sinks without their own export loop.
    fn report(&self) {}
}

/// Runs `fut`, recording its wall-clock duration under `metric` labeled with
/// the outcome. Both success and failure produce a sample.
pub async fn timed<F, T>(sink: &dyn MetricsSink, metric: &Metric, fut: F) -> Result<T, QueueError>
where
    F: Future<Output = Result<T, QueueError>>,
{
    let start = Instant::now();
    let result = fut.await;
    let outcome = match &result {
        Ok(_) => OUTCOME_SUCCESS,
        Err(err) => err.outcome(),
    };
    sink.record_duration(metric, start.elapsed(), &[(OUTCOME_LABEL, outcome)]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::Order;
    use crate::testutil::RecordingSink;

    #[tokio::test(start_paused = true)]
    async fn timed_records_success_sample() {
        let sink = RecordingSink::default();

        let value = timed(&sink, &ORDER_SERVICE_DURATION, async {
            tokio::time::sleep(Duration::from_millis(250)).await;
            Ok::<_, QueueError>(7)
        })
        .await
        .expect("timed future succeeds");

        assert_eq!(value, 7);
        let samples = sink.durations(ORDER_SERVICE_DURATION.name);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].outcome.as_deref(), Some(OUTCOME_SUCCESS));
        assert_eq!(samples[0].elapsed, Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_records_interrupted_sample() {
        let sink = RecordingSink::default();

        let result = timed(&sink, &ORDER_SERVICE_DURATION, async {
            Err::<(), _>(QueueError::Interrupted {
                order: Order::ale(1),
            })
        })
        .await;

        assert!(result.is_err());
        let samples = sink.durations(ORDER_SERVICE_DURATION.name);
        assert_eq!(samples[0].outcome.as_deref(), Some(OUTCOME_INTERRUPTED));
    }
}
