//! Shared server state: the worker, its store, the relay and the backup sink.

use std::sync::Arc;

use larder_client::{FetchConfig, HttpFetcher, RelayConfig, RelayGateway, ServiceWorker, WorkerConfig};
use larder_core::{AppConfig, CacheDb, Error};

use crate::tools::lifecycle::run_install;

pub struct AppState {
    pub config: AppConfig,
    pub db: CacheDb,
    pub worker: ServiceWorker,
    pub relay: RelayGateway,
}

impl AppState {
    /// Open the SQLite store at `config.db_path` and build the worker on it.
    pub async fn open(config: AppConfig) -> Result<Self, Error> {
        let db = CacheDb::open(&config.db_path).await?;
        Self::with_db(config, db)
    }

    pub fn with_db(config: AppConfig, db: CacheDb) -> Result<Self, Error> {
        let fetcher = Arc::new(HttpFetcher::new(FetchConfig::from(&config))?);
        let worker = ServiceWorker::new(WorkerConfig::from_app(&config)?, Arc::new(db.clone()), fetcher)?;
        let relay = RelayGateway::new(RelayConfig::from(&config))?;

        Ok(Self { config, db, worker, relay })
    }

    /// Resume an already activated version, otherwise install (and activate,
    /// when skipping the wait) at startup. Failures are logged; the worker
    /// stays in a state where the host can retry.
    pub async fn bootstrap(&self) {
        match self.worker.restore().await {
            Ok(true) => {
                tracing::info!(version = %self.config.version, "resumed activated version");
                return;
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(version = %self.config.version, error = %e, "activation record unreadable"),
        }

        if !self.config.bootstrap_on_start {
            return;
        }

        match run_install(&self.worker).await {
            Ok(output) => tracing::info!(
                version = %self.config.version,
                assets = output.assets,
                state = %output.state,
                "bootstrap complete"
            ),
            Err(e) => tracing::warn!(version = %self.config.version, error = %e, "bootstrap install failed"),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A small site served by mockito: `/`, `/favicon.svg` and `/src/app.css`.
    pub(crate) async fn site() -> mockito::ServerGuard {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html>home</html>")
            .create_async()
            .await;
        server
            .mock("GET", "/favicon.svg")
            .with_status(200)
            .with_header("content-type", "image/svg+xml")
            .with_body("<svg/>")
            .create_async()
            .await;
        server
            .mock("GET", "/src/app.css")
            .with_status(200)
            .with_header("content-type", "text/css")
            .with_body("body{}")
            .create_async()
            .await;
        server
    }

    pub(crate) fn config_for(server: &mockito::ServerGuard) -> AppConfig {
        AppConfig {
            origin: server.url(),
            static_assets: vec!["/".into(), "/favicon.svg".into()],
            fallback_asset: Some("/favicon.svg".into()),
            timeout_ms: 2_000,
            ..Default::default()
        }
    }

    pub(crate) async fn state_with(config: AppConfig) -> AppState {
        let db = CacheDb::open_in_memory().await.unwrap();
        AppState::with_db(config, db).unwrap()
    }
}
