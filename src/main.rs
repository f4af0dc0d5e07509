use std::sync::Arc;

use anyhow::Context;
use order_queue_telemetry::{
    OrderGenerator, OrderQueueService, ServiceConfig, TelemetryConfig, init_telemetry, runtime,
    shutdown,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let telemetry = TelemetryConfig::from_env()?;
    let cfg = ServiceConfig::from_env()?;
    let sink = init_telemetry(&telemetry)?;

    let token = CancellationToken::new();
    let service = Arc::new(OrderQueueService::new(
        Arc::clone(&sink),
        cfg.queue_options(token.clone()),
    ));
    let drivers = runtime::spawn(
        Arc::clone(&service),
        sink,
        &cfg,
        OrderGenerator::new(),
        token.clone(),
    );

    info!(
        service = %telemetry.service_name,
        export = ?telemetry.mode,
        produce_ms = cfg.produce_interval.as_millis() as u64,
        drain_ms = cfg.drain_interval.as_millis() as u64,
        policy = ?cfg.policy,
        "order queue running; press ctrl-c to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("listening for ctrl-c")?;
    info!(queue_size = service.queue_size(), "shutdown requested");
    token.cancel();
    drivers.join().await;

    shutdown();
    Ok(())
}
