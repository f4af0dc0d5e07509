use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use order_queue_telemetry::testutil::RecordingSink;
use order_queue_telemetry::{DrainOutcome, Order, OrderQueueService, QueueOptions};

const PRODUCERS: u32 = 8;
const PER_PRODUCER: u32 = 250;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_enqueue_and_drain_never_duplicate_orders() {
    let sink = RecordingSink::new();
    let service = Arc::new(OrderQueueService::new(
        Arc::new(sink.clone()),
        QueueOptions {
            time_unit: Duration::ZERO,
            ..QueueOptions::default()
        },
    ));

    let mut producers = Vec::new();
    for producer in 0..PRODUCERS {
        let service = Arc::clone(&service);
        producers.push(tokio::spawn(async move {
            for i in 0..PER_PRODUCER {
                // magnitude carries a unique id; the zero time unit keeps serves instant
                let id = producer * PER_PRODUCER + i;
                let order = if id % 2 == 0 {
                    Order::ale(id)
                } else {
                    Order::light(id)
                };
                service.enqueue(order);
                tokio::task::yield_now().await;
            }
        }));
    }

    let mut consumers = Vec::new();
    for _ in 0..4 {
        let service = Arc::clone(&service);
        consumers.push(tokio::spawn(async move {
            let mut served = Vec::new();
            for _ in 0..PRODUCERS * PER_PRODUCER {
                if let Ok(DrainOutcome::Served(order)) = service.serve_next().await {
                    served.push(order.magnitude());
                }
                tokio::task::yield_now().await;
            }
            served
        }));
    }

    for producer in producers {
        producer.await.expect("producer task");
    }

    let mut seen = HashSet::new();
    let mut total = 0usize;
    for consumer in consumers {
        for id in consumer.await.expect("consumer task") {
            assert!(seen.insert(id), "order {id} served twice");
            total += 1;
        }
    }
    while let Ok(DrainOutcome::Served(order)) = service.drain_one().await {
        assert!(seen.insert(order.magnitude()), "order served twice");
        total += 1;
    }

    let expected = (PRODUCERS * PER_PRODUCER) as usize;
    assert_eq!(total, expected);
    assert_eq!(service.queue_size(), 0);
    assert_eq!(
        sink.counter("orders", "type", "ale"),
        Some(u64::from(PRODUCERS * PER_PRODUCER / 2))
    );
    assert_eq!(
        sink.counter("orders", "type", "light"),
        Some(u64::from(PRODUCERS * PER_PRODUCER / 2))
    );
    assert_eq!(service.active_serves(), 0);
}
