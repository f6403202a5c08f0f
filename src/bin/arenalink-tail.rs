//! Follow everything an attraction server publishes
//!
//! Connects with the `ARENALINK_*` environment configuration, subscribes to
//! every topic and logs each delivery and connection event until Ctrl+C.
//! OpenTelemetry export is enabled when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
//!
//! Usage:
//! ```text
//! ARENALINK_HOST=192.168.1.5:3000 ARENALINK_SOCKET_TYPE=9 cargo run --bin arenalink-tail
//! ```

use arenalink::core::{init_observability, shutdown_observability, ObservabilityConfig};
use arenalink::{ArenaClient, ClientConfig, Delivery, Topic};
use tokio::sync::{broadcast, mpsc};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = ClientConfig::from_env();
    let export = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok();
    let observability = ObservabilityConfig::new("arenalink-tail")
        .with_traces(export)
        .with_metrics(export)
        .with_json_logs(false);

    let mut builder = ArenaClient::builder(config.clone());
    if export {
        builder = builder.with_observability(observability);
    } else {
        init_observability(observability)?;
    }
    let client = builder.build()?;

    let (tx, mut deliveries) = mpsc::unbounded_channel::<Delivery>();
    client.subscribe(Topic::ALL, tx).await;
    let mut events = client.events();

    tracing::info!(
        address = %config.address(),
        device_id = %config.device_id,
        socket_type = %config.socket_type,
        "Tailing attraction server"
    );
    client.connect()?;

    loop {
        tokio::select! {
            Some(delivery) = deliveries.recv() => {
                tracing::info!(topic = %delivery.topic, data = %delivery.data, "Delivery");
            }
            event = events.recv() => match event {
                Ok(event) => tracing::info!(event = ?event, "Connection event"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Missed connection events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    client.shutdown()?;
    shutdown_observability();
    Ok(())
}
