use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use sfox_book_feed::config::Config;
use sfox_book_feed::feed::IngestionCoordinator;
use sfox_book_feed::orderbook::OrderBookStore;
use sfox_book_feed::server::{self, SnapshotService};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Another provider may already be installed; either way one is available.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = Config::parse();
    let credentials = config.credentials()?;
    info!(
        instruments = ?config.instruments,
        listen = %config.listen,
        feed_url = %config.feed_url,
        "starting order book feed"
    );

    // Bind before any feed connection starts so a taken port fails fast.
    let listener = tokio::net::TcpListener::bind(config.listen).await?;

    let cancel = CancellationToken::new();
    let store = Arc::new(OrderBookStore::new());

    let coordinator =
        IngestionCoordinator::new(Arc::clone(&store), credentials, config.supervisor_config())
            .with_stagger(config.stagger());
    let ingestion = coordinator.start(&config.instruments, cancel.clone());

    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("received shutdown signal, draining");
        shutdown_cancel.cancel();
    });

    let served = server::serve(listener, SnapshotService::new(store), cancel.clone()).await;
    cancel.cancel();

    let states = ingestion.join().await;
    info!(supervisors = states.len(), "shutdown complete");

    served?;
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(err) => {
                error!(error = %err, "failed to register SIGTERM handler");
                if let Err(err) = tokio::signal::ctrl_c().await {
                    error!(error = %err, "failed to listen for ctrl+c");
                }
            }
        }
    }
    #[cfg(not(unix))]
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for ctrl+c");
    }
}
