//! Viewer server binary: binds the run API on localhost.

use std::net::SocketAddr;
use std::sync::Arc;

use agentdbg_config::Config;
use agentdbg_server::{create_app, ServerState};
use agentdbg_store::RunStore;

const DEFAULT_PORT: u16 = 8787;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::load();
    let state = Arc::new(ServerState { store: RunStore::new(&config.data_dir) });

    let port = std::env::var("AGENTDBG_PORT")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("agentdbg viewer listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, create_app(state)).await?;
    Ok(())
}
