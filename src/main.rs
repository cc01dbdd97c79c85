//! The `devmesh` server binary.
//!
//! Usage: `devmesh [config.yaml]`. With no argument, the path is taken
//! from `DEVMESH_CONFIG`, falling back to built-in defaults (stub
//! embedder, in-memory stores) which are enough to exercise the whole
//! pipeline locally.

use std::sync::Arc;

use devmesh::config::DevMeshConfig;
use devmesh::{start_server, ServerState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("DEVMESH_CONFIG").ok());
    let config = match config_path {
        Some(path) => DevMeshConfig::from_file(&path)
            .map_err(|e| anyhow::anyhow!("failed to load {path}: {e}"))?,
        None => DevMeshConfig::default(),
    };

    init_tracing(&config.server.log_level);
    if let Some(name) = &config.name {
        tracing::info!(deployment = %name, "configuration loaded");
    }

    let state = Arc::new(ServerState::new(
        config.server_config(),
        config.core_options(),
    )?);
    start_server(state).await
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .json()
        .init();
}
