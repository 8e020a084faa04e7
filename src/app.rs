use crate::config::Config;
use crate::detection::DetectionClient;
use crate::server::HttpServer;
use crate::storage::ImageStore;

use std::{error::Error, sync::Arc};
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let store = match ImageStore::new(&config.upload.storage_dir) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("Failed to initialize image store: {:?}", e);
            return Err(Box::new(e));
        }
    };

    let detector = match DetectionClient::from_config(&config.detection) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!("Failed to initialize detection client: {:?}", e);
            return Err(Box::new(e));
        }
    };
    if config.detection.dry_run {
        tracing::info!("Detection client running in dry-run mode, no cloud calls will be made");
    }

    let server = HttpServer::new(detector, store, &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();

    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    let _ = server_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
