/**
 * MESHWATCH KERNEL - Entry point
 *
 * ROLE: wires config, MQTT supervisor, ingestion pipeline, console view
 * and HTTP read API together, then serves until Ctrl-C.
 */

use anyhow::{Context, Result};
use meshwatch_kernel::config::load_config;
use meshwatch_kernel::console::ConsoleView;
use meshwatch_kernel::http::{build_router, AppState};
use meshwatch_kernel::mqtt::MqttTransport;
use meshwatch_kernel::{ConnectionSupervisor, HealthTracker, Ingestor, SnapshotPublisher};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const INBOUND_QUEUE: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("meshwatch_kernel=info")),
        )
        .init();

    let cfg = load_config().await.context("Failed to load configuration")?;
    info!(broker = %cfg.mqtt.host, port = cfg.mqtt.port, topics = ?cfg.topics, "meshwatch kernel starting");

    let publisher = SnapshotPublisher::new();
    let health_tracker = HealthTracker::new();

    // single writer path: supervisor -> channel -> ingestor
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
    let ingest = Ingestor::new(publisher.clone(), health_tracker.clone()).spawn(inbound_rx);

    let (supervisor, shutdown) = ConnectionSupervisor::new(
        MqttTransport::new(&cfg.mqtt),
        cfg.supervisor_settings(),
        publisher.clone(),
        health_tracker.clone(),
        inbound_tx,
    );
    let supervisor = supervisor.spawn();

    let console = ConsoleView::new(cfg.operator.clone()).spawn(publisher.clone());

    let app = build_router(AppState {
        publisher: publisher.clone(),
        health_tracker,
        session: cfg.operator.clone(),
        stale_after: time::Duration::seconds(cfg.stale_after_secs as i64),
    });

    let listener = TcpListener::bind(&cfg.http.bind)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.http.bind))?;
    info!("listening on http://{}", cfg.http.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Ctrl-C received");
        })
        .await
        .context("HTTP server failed")?;

    shutdown.shutdown();
    supervisor.await.context("supervisor task panicked")?;
    // supervisor dropped its sender, the pipeline drains and stops
    ingest.await.context("ingestion task panicked")?;
    console.abort();

    info!(status = %publisher.status(), nodes = publisher.node_count(), "meshwatch kernel stopped");
    Ok(())
}
