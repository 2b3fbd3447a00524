//! Ludo multiplayer game server.

use ludo_server::server::{self, ServerState};
use ludo_server::ServerConfig;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Ludo server...");
    if config.orchestrator.allow_dice_override {
        warn!("client dice overrides are enabled");
    }

    let state = Arc::new(ServerState::new(config.orchestrator));

    server::run_server(config.addr, state).await
}
