//! Prometheus exporter for Drayton Wiser heating hubs.

use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use wiser_exporter_prometheus::cycle::resolve_hub_identity;
use wiser_exporter_prometheus::{
    CollectionCycle, ExporterArgs, ExporterConfig, HttpServer, InstrumentRegistry, Poller,
    init_tracing,
};
use wiser_hub::WiserHub;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let args = ExporterArgs::parse();

    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };
    config.apply_overrides(args.overrides());
    config.validate()?;

    init_tracing(&config.logging)?;

    info!("Starting Wiser Prometheus Exporter");

    let hub_settings = config.hub_settings()?;
    let listen_addr = config.listen_addr()?;
    let delay = config.poll_delay();

    let client = WiserHub::new(&hub_settings.host, &hub_settings.secret, hub_settings.timeout)?;
    let instruments = InstrumentRegistry::new();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Bind before polling so a busy port fails fast
    let http_server = HttpServer::new(
        instruments.exposition(),
        listen_addr,
        config.prometheus.path.clone(),
    );
    let listener = http_server.bind().await?;

    let http_shutdown = shutdown_rx.clone();
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.serve(listener, http_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    let mut poller_shutdown = shutdown_rx.clone();
    let host = client.host().to_string();
    let poller_task = tokio::spawn(async move {
        let Some(hub) = resolve_hub_identity(&client, &host, delay, &mut poller_shutdown).await
        else {
            return;
        };

        let cycle = CollectionCycle::new(client, hub, instruments);
        Poller::new(cycle, delay).run(poller_shutdown).await;
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    shutdown_tx.send(true)?;

    // An in-flight cycle is bounded by the hub request timeout
    let grace = hub_settings.timeout + Duration::from_secs(5);
    if tokio::time::timeout(grace, async {
        let _ = poller_task.await;
        let _ = http_task.await;
    })
    .await
    .is_err()
    {
        error!("Timed out waiting for tasks to stop");
    }

    info!("Exporter stopped");
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
