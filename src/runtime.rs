use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, interval, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::metrics::MetricsSink;
use crate::order::Order;
use crate::service::{DrainOutcome, OrderQueueService};

/// Background tasks feeding, draining and reporting one service.
pub struct Drivers {
    handles: Vec<JoinHandle<()>>,
}

impl Drivers {
    /// Waits for every driver to stop. Call after cancelling the token they
    /// were spawned with.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(err) = handle.await {
                warn!("driver task failed: {err}");
            }
        }
    }
}

/// Spawns the producer, consumer and reporter loops.
///
/// The producer first fires one period after start; the consumer fires
/// immediately and then every `drain_interval`.
pub fn spawn<I>(
    service: Arc<OrderQueueService>,
    sink: Arc<dyn MetricsSink>,
    cfg: &ServiceConfig,
    orders: I,
    shutdown: CancellationToken,
) -> Drivers
where
    I: Iterator<Item = Order> + Send + 'static,
{
    let handles = vec![
        tokio::spawn(produce(
            Arc::clone(&service),
            orders,
            cfg.produce_interval,
            shutdown.clone(),
        )),
        tokio::spawn(consume(service, cfg.drain_interval, shutdown.clone())),
        tokio::spawn(report(sink, cfg.report_interval, shutdown)),
    ];
    Drivers { handles }
}

async fn produce<I>(
    service: Arc<OrderQueueService>,
    mut orders: I,
    period: Duration,
    shutdown: CancellationToken,
) where
    I: Iterator<Item = Order>,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(order) = orders.next() else {
            info!("order source exhausted; producer stopping");
            break;
        };
        service.enqueue(order);
    }
    debug!("producer stopped");
}

async fn consume(service: Arc<OrderQueueService>, period: Duration, shutdown: CancellationToken) {
    let mut ticker = interval(period);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        match service.serve_next().await {
            Ok(DrainOutcome::Idle) => debug!("no orders to serve"),
            Ok(DrainOutcome::Served(order)) => info!(
                category = order.category(),
                magnitude = order.magnitude(),
                queue_size = service.queue_size(),
                "order served"
            ),
            Err(err) => warn!(error = %err, "order serve aborted"),
        }
    }
    debug!("consumer stopped");
}

async fn report(sink: Arc<dyn MetricsSink>, period: Duration, shutdown: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => sink.report(),
        }
    }
    sink.report();
    debug!("reporter stopped");
}
