//! wfengine - Workflow Engine
//!
//! An HTTP service for registering workflow definitions, starting instances
//! and executing actions on them.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;
use wfengine_core::WorkflowEngine;
use wfengine_server::config::StorageBackend;
use wfengine_server::metrics::run_metrics_server;
use wfengine_server::{Config, Metrics, Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if WFENGINE_CONFIG is set, then env overrides)
    let config_path = std::env::var("WFENGINE_CONFIG").ok();
    let config = match Config::load() {
        Ok(c) => {
            if let Some(ref path) = config_path {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // An explicitly named config file must load
            if config_path.is_some() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::info!("Using default configuration");
            Config::from_env()
        }
    };

    tracing::info!("Starting wfengine server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    match config.storage.backend {
        StorageBackend::Memory => tracing::info!("  Storage: memory"),
        StorageBackend::File => tracing::info!(
            "  Storage: file ({})",
            config.storage.data_dir.display()
        ),
    }
    tracing::info!("  Validation: {:?}", config.engine.validation_mode());

    let repository = config.storage.open_repository()?;
    let engine = Arc::new(
        WorkflowEngine::new(repository).with_validation_mode(config.engine.validation_mode()),
    );

    let (metrics_shutdown, _) = broadcast::channel(1);
    let mut server_config = ServerConfig::new(config.network.bind_addr)
        .with_max_body_bytes(config.network.max_body_bytes);

    let metrics_handle = if config.metrics.enabled {
        let metrics = Arc::new(Metrics::new()?);
        server_config = server_config.with_metrics(metrics.clone());

        let addr = config.metrics.bind_addr;
        let shutdown_rx = metrics_shutdown.subscribe();
        tracing::info!("  Metrics: enabled ({})", addr);
        Some(tokio::spawn(async move {
            if let Err(e) = run_metrics_server(addr, metrics, shutdown_rx).await {
                tracing::error!("Metrics server error: {}", e);
            }
        }))
    } else {
        tracing::info!("  Metrics: disabled");
        None
    };

    let server = Arc::new(Server::new(server_config, engine));

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
        let _ = metrics_shutdown.send(());
    });

    // Run server (blocks until shutdown)
    server.run().await?;

    if let Some(handle) = metrics_handle {
        let _ = handle.await;
    }

    tracing::info!("Server stopped");
    Ok(())
}
