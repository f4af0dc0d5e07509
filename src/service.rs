use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::anyhow;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use crate::error::QueueError;
use crate::metrics::{
    CATEGORY_LABEL, GaugeCallback, MetricsSink, ORDER_SERVICE_ACTIVE, ORDER_SERVICE_DURATION,
    ORDERS, ORDERS_IN_QUEUE, timed,
};
use crate::order::{ALE, LIGHT, Order};

/// Which categories get a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountPolicy {
    /// Only `light` and `ale` are counted; other categories are queued but
    /// never counted.
    #[default]
    Fixed,
    /// A counter is created the first time a category is seen.
    OnDemand,
}

impl FromStr for CountPolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "fixed" => Ok(CountPolicy::Fixed),
            "on-demand" | "on_demand" | "ondemand" => Ok(CountPolicy::OnDemand),
            other => Err(anyhow!(
                "unsupported count policy '{other}', expected fixed or on-demand"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueOptions {
    pub policy: CountPolicy,
    /// Serving an order waits `magnitude * time_unit`.
    pub time_unit: Duration,
    /// Cancelling this interrupts an in-progress serve.
    pub shutdown: CancellationToken,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            policy: CountPolicy::Fixed,
            time_unit: Duration::from_secs(1),
            shutdown: CancellationToken::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The queue was empty.
    Idle,
    Served(Order),
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Order>,
    counts: HashMap<String, u64>,
}

/// In-memory FIFO of orders reporting counters, a size gauge and serve
/// timings to a [`MetricsSink`].
pub struct OrderQueueService {
    state: Arc<Mutex<QueueState>>,
    active: Arc<AtomicU64>,
    sink: Arc<dyn MetricsSink>,
    policy: CountPolicy,
    time_unit: Duration,
    shutdown: CancellationToken,
}

impl OrderQueueService {
    pub fn new(sink: Arc<dyn MetricsSink>, options: QueueOptions) -> Self {
        let service = Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            active: Arc::new(AtomicU64::new(0)),
            sink,
            policy: options.policy,
            time_unit: options.time_unit,
            shutdown: options.shutdown,
        };

        if service.policy == CountPolicy::Fixed {
            for category in [LIGHT, ALE] {
                service.ensure_counter(category);
            }
        }

        let state = Arc::clone(&service.state);
        let queue_size: GaugeCallback = Arc::new(move || lock(&state).pending.len() as u64);
        service.sink.register_gauge(&ORDERS_IN_QUEUE, queue_size);

        let active = Arc::clone(&service.active);
        let in_flight: GaugeCallback = Arc::new(move || active.load(Ordering::Relaxed));
        service.sink.register_gauge(&ORDER_SERVICE_ACTIVE, in_flight);

        service
    }

    /// Appends `order` to the tail of the queue and counts it per the
    /// configured [`CountPolicy`].
    pub fn enqueue(&self, order: Order) {
        let category = order.category().to_string();
        let (counted, created, size) = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            let (counted, created) = if let Some(count) = state.counts.get_mut(&category) {
                *count += 1;
                (true, false)
            } else if self.policy == CountPolicy::OnDemand {
                state.counts.insert(category.clone(), 1);
                (true, true)
            } else {
                (false, false)
            };
            state.pending.push_back(order);
            (counted, created, state.pending.len())
        };

        let labels = [(CATEGORY_LABEL, category.as_str())];
        if created {
            self.sink.register_counter(&ORDERS, &labels);
        }
        if counted {
            self.sink.increment_counter(&ORDERS, &labels);
        } else {
            debug!(category = %category, "order category not counted");
        }
        debug!(category = %category, queue_size = size, "order enqueued");
    }

    /// Removes the oldest order and waits proportionally to its magnitude.
    ///
    /// The wait happens after the order left the queue and outside the lock,
    /// so producers are never blocked by a serve in progress. On shutdown the
    /// order is reported through [`QueueError::Interrupted`] and stays removed.
    pub async fn drain_one(&self) -> Result<DrainOutcome, QueueError> {
        let Some(order) = self.take_next() else {
            return Ok(DrainOutcome::Idle);
        };

        let wait = self.time_unit.saturating_mul(order.magnitude());
        debug!(
            category = order.category(),
            magnitude = order.magnitude(),
            wait_ms = wait.as_millis() as u64,
            "serving order"
        );
        if wait.is_zero() {
            return Ok(DrainOutcome::Served(order));
        }

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                warn!(
                    category = order.category(),
                    magnitude = order.magnitude(),
                    "serving interrupted by shutdown; order dropped"
                );
                Err(QueueError::Interrupted { order })
            }
            _ = tokio::time::sleep(wait) => Ok(DrainOutcome::Served(order)),
        }
    }

    /// [`Self::drain_one`] wrapped in the `orderServiceDuration` timer and
    /// tracked as an active serve while it runs.
    pub async fn serve_next(&self) -> Result<DrainOutcome, QueueError> {
        let _active = ActiveServe::enter(Arc::clone(&self.active));
        timed(self.sink.as_ref(), &ORDER_SERVICE_DURATION, self.drain_one())
            .instrument(info_span!("order.serve"))
            .await
    }

    pub fn queue_size(&self) -> usize {
        lock(&self.state).pending.len()
    }

    /// Count recorded for `category`, or `None` when it has no counter.
    pub fn category_count(&self, category: &str) -> Option<u64> {
        lock(&self.state).counts.get(category).copied()
    }

    pub fn active_serves(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    pub fn policy(&self) -> CountPolicy {
        self.policy
    }

    fn take_next(&self) -> Option<Order> {
        lock(&self.state).pending.pop_front()
    }

    fn ensure_counter(&self, category: &str) {
        let created = {
            let mut state = lock(&self.state);
            if state.counts.contains_key(category) {
                false
            } else {
                state.counts.insert(category.to_string(), 0);
                true
            }
        };
        if created {
            self.sink
                .register_counter(&ORDERS, &[(CATEGORY_LABEL, category)]);
        }
    }
}

fn lock(state: &Mutex<QueueState>) -> MutexGuard<'_, QueueState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps the in-flight serve count accurate even if the serve future is
/// dropped midway.
struct ActiveServe {
    active: Arc<AtomicU64>,
}

impl ActiveServe {
    fn enter(active: Arc<AtomicU64>) -> Self {
        active.fetch_add(1, Ordering::Relaxed);
        Self { active }
    }
}

impl Drop for ActiveServe {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }
}
