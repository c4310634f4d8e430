//! cask-server - HTTP server with per-request sessions
//!
//! Serves a small session API over TCP; sessions live in the cookie or in
//! an in-process store depending on configuration.

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod middleware;
mod routes;
mod state;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("cask_server=info".parse()?))
        .init();

    info!("cask-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = config::Config::load()?;
    info!("Config loaded from {:?}", config.config_path);

    let listen = config.listen.clone();
    let state = state::AppState::new(config)?;
    info!(store = state.store_kind(), key = %state.sessions.key, "Sessions configured");

    let app = routes::create_router(state);
    let listener = TcpListener::bind(&listen).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
