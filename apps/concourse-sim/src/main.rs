//! # Concourse Simulator
//!
//! Runs the fulfillment engine against synthetic traffic.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  OrderGenerator ──mpsc──► IngestionAdapter::pump ──► FulfillmentEngine  │
//! │  Kitchen (system actor) ─── accept / start_preparing ──┘      │         │
//! │  SlaScheduler (1 Hz) ──────────────────────────────────────────┘         │
//! │  BroadcastSink ──► event logger (one JSON line per domain event)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Configuration comes from `engine.toml` in the platform config directory
//! (or the path in `CONCOURSE_CONFIG`), then `CONCOURSE_*` overrides.
//! Log verbosity follows `RUST_LOG`.

mod generator;
mod kitchen;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use concourse_engine::{
    Actor, BroadcastSink, DomainEvent, EngineConfig, FulfillmentEngine, IngestionAdapter, Role,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::generator::OrderGenerator;
use crate::kitchen::Kitchen;

const EVENT_BUFFER: usize = 256;
const INGEST_BUFFER: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_path = std::env::var_os("CONCOURSE_CONFIG").map(PathBuf::from);
    let config = EngineConfig::load_or_default(config_path);
    info!(
        merchant = %config.merchant_id(),
        max_queue = config.capacity.max_queue_length,
        order_interval_secs = config.simulator.order_interval_secs,
        "Starting Concourse simulator"
    );

    let sink = Arc::new(BroadcastSink::new(EVENT_BUFFER));
    let events = sink.subscribe();
    let engine = Arc::new(
        FulfillmentEngine::builder(config.clone())
            .with_sink(sink)
            .build()?,
    );

    let scheduler = engine.spawn_scheduler();
    let logger = tokio::spawn(log_events(events));

    // Order source
    let (order_tx, order_rx) = mpsc::channel(INGEST_BUFFER);
    let (generator_stop_tx, generator_stop_rx) = mpsc::channel(1);
    let generator = OrderGenerator::new(Duration::from_secs(config.simulator.order_interval_secs.max(1)));
    let generator_task = tokio::spawn(generator.run(order_tx, generator_stop_rx));

    let adapter = IngestionAdapter::new(
        engine.clone(),
        Actor::new("simulator", "Synthetic order source", Role::System),
    );
    let pump_task = tokio::spawn(async move { adapter.pump(order_rx).await });

    // Counter staff
    let (kitchen_stop_tx, kitchen_stop_rx) = mpsc::channel(1);
    let kitchen = Kitchen::new(
        engine.clone(),
        config.simulator.advance_probability,
        Duration::from_secs(config.simulator.advance_interval_secs.max(1)),
    );
    let kitchen_task = tokio::spawn(kitchen.run(kitchen_stop_rx));

    shutdown_signal().await;

    let _ = generator_stop_tx.send(()).await;
    let _ = kitchen_stop_tx.send(()).await;
    generator_task.await?;
    kitchen_task.await?;
    let stats = pump_task.await?;
    scheduler.shutdown().await?;

    let capacity = engine.get_capacity()?;
    info!(
        admitted = stats.admitted,
        denied = stats.denied,
        invalid = stats.invalid,
        queue = capacity.current_queue_length,
        active_clocks = engine.active_clocks()?.len(),
        "Simulator stopped"
    );

    // The engine holds the last sender; dropping it closes the logger.
    drop(engine);
    logger.await?;
    Ok(())
}

/// Prints every domain event as one JSON line.
async fn log_events(mut rx: broadcast::Receiver<DomainEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let line = serde_json::to_string(&event).unwrap_or_else(|e| e.to_string());
                match event {
                    DomainEvent::SlaBreached { .. } | DomainEvent::AdmissionDenied { .. } => {
                        warn!(event = event.name(), "{}", line)
                    }
                    _ => info!(event = event.name(), "{}", line),
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event logger lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, stopping simulator..."),
        Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C, stopping now"),
    }
}
