//! EV Simulation Dashboard Server
//!
//! REST API over the telemetry and route simulators, with SSE streams

use anyhow::Result;
use evsim_server::{api, config::ServerConfig, state};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting EV simulation server");

    let config = ServerConfig::load()?;
    let addr = config.bind_addr;

    let state = state::AppState::new(config);
    state.start().await;

    let app = api::create_router(state);

    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
