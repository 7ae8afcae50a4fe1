//! Framecast relay — WebSocket backend distributing the latest frame.
//!
//! Optional env: HOST, PORT

use std::sync::Arc;

use relay::relay::RelayState;
use relay::{api, config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = config::Config::from_env();
    let addr = format!("{}:{}", config.host, config.port);

    let state = api::AppState {
        relay: Arc::new(RelayState::new()),
    };
    let app = api::router(state);

    tracing::info!("Relay listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Resolves on SIGINT; axum then stops accepting, drains, and closes the
/// listener, and `main` returns with status 0.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("shutting down");
}
