//! viewdb - remote read-only key-value views
//!
//! A TCP server exposing read-only transactions, buckets, and streaming
//! cursors over an ordered key-value store.

use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use viewdb_server::{Config, Server, ServerConfig};
use viewdb_store::MemoryEngine;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if VIEWDB_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("VIEWDB_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if std::env::var("VIEWDB_CONFIG").is_ok() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::info!("Using default configuration");
            Config::default()
        }
    };

    tracing::info!("Starting viewdb server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Max connections: {}", config.network.max_connections);

    // The in-memory engine stands in for any ordered KV store implementing
    // the viewdb-store engine traits.
    let engine = Arc::new(MemoryEngine::new());

    let server_config = ServerConfig::new(config.network.bind_addr)
        .with_max_connections(config.network.max_connections)
        .with_read_buffer_size(config.network.read_buffer_size);
    let server = Arc::new(Server::new(server_config, engine));

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Run server (blocks until shutdown; in-flight sessions drain on their own)
    server.run().await?;

    tracing::info!("Server stopped");
    Ok(())
}
