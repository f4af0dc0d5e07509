use thiserror::Error;

use crate::order::Order;

/// Failures surfaced by [`crate::OrderQueueService`] operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Shutdown arrived while an order was being served.
    ///
    /// The order was already removed from the queue and is not re-queued:
    /// processing is at-most-once.
    #[error("serving order {order:?} was interrupted")]
    Interrupted { order: Order },
}

impl QueueError {
    /// Timer label describing how the timed operation ended.
    pub fn outcome(&self) -> &'static str {
        match self {
            QueueError::Interrupted { .. } => crate::metrics::OUTCOME_INTERRUPTED,
        }
    }
}
