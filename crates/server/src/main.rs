//! larder server entry point.
//!
//! Loads configuration, opens the partition store, builds the cache worker and
//! serves it as MCP tools on stdio. Logging goes to stderr to avoid
//! interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

use larder_core::AppConfig;

mod error;
mod handler;
mod state;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        version = %config.version,
        origin = %config.origin,
        db_path = %config.db_path.display(),
        "Starting larder server on stdio transport"
    );

    let state = Arc::new(state::AppState::open(config).await?);
    state.bootstrap().await;

    let handler = handler::LarderServer::new(state);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
