//! Pharmacy Agent API server.
//!
//! A stateless AI pharmacy agent providing medication information,
//! inventory checks, and prescription management via streaming chat.

mod api;
mod router;
mod state;

use std::sync::Arc;

use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pharma_core::config::load_dotenv();
    let config = pharma_core::Config::from_env();

    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    info!("Starting Pharmacy Agent API v{}", env!("CARGO_PKG_VERSION"));

    let state = Arc::new(state::AppState::from_config(&config));
    let app = router::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
