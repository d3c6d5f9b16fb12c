//! The offline cache worker.
//!
//! [`ServiceWorker`] receives lifecycle signals from its host and answers each
//! with an [`Outcome`]:
//!
//! - `Install`: precache the manifest into `static:<version>` (all or nothing)
//! - `Activate`: purge every partition the current version does not own
//! - `Message`: `SKIP_WAITING` asks for activation without waiting
//! - `Fetch`: route the request to a delivery strategy, or pass it through
//!
//! Fetches are only intercepted once the worker is activated. Activation is
//! recorded in the store, and [`ServiceWorker::restore`] picks it back up after
//! a restart without touching the network.

pub mod registry;
pub mod selector;
pub mod strategy;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use url::Url;

use larder_core::{AppConfig, CapturedResponse, Error, FetchRequest, PartitionStore, RequestKey};

pub use registry::{CacheRegistry, Manifest, Partition, PartitionNames};
pub use selector::{Route, Strategy, select};
pub use strategy::{Delivery, Resolver, Source};

use crate::fetch::{Fetcher, resolve};

/// Worker settings for one deployed version.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub version: String,
    pub origin: Url,
    pub static_assets: Vec<String>,
    pub fallback_asset: Option<String>,
    pub timeout: Duration,
    pub skip_waiting: bool,
    pub claim_clients: bool,
}

impl WorkerConfig {
    pub fn from_app(config: &AppConfig) -> Result<Self, Error> {
        Ok(Self {
            version: config.version.clone(),
            origin: config.origin_url()?,
            static_assets: config.static_assets.clone(),
            fallback_asset: config.fallback_asset.clone(),
            timeout: config.timeout(),
            skip_waiting: config.skip_waiting,
            claim_clients: config.claim_clients,
        })
    }
}

/// Lifecycle position of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
        };
        f.write_str(s)
    }
}

/// Message posted to the worker by a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage {
    SkipWaiting,
    Other(String),
}

impl From<&str> for WorkerMessage {
    fn from(value: &str) -> Self {
        match value.trim() {
            "SKIP_WAITING" => WorkerMessage::SkipWaiting,
            other => WorkerMessage::Other(other.to_string()),
        }
    }
}

/// Signal delivered by the host.
#[derive(Debug, Clone)]
pub enum Signal {
    Install,
    Activate,
    Message(WorkerMessage),
    Fetch(FetchRequest),
}

/// Result of handling one signal.
#[derive(Debug, Clone)]
pub enum Outcome {
    Installed { partition: String, assets: usize, skip_waiting: bool },
    Activated { purged: Vec<String>, claim_clients: bool },
    SkipWaiting,
    Ignored,
    Response { strategy: Strategy, delivery: Delivery },
    Passthrough,
}

pub struct ServiceWorker {
    config: WorkerConfig,
    names: PartitionNames,
    manifest: Manifest,
    registry: CacheRegistry,
    resolver: Resolver,
    fetcher: Arc<dyn Fetcher>,
    state: RwLock<WorkerState>,
    skip_waiting_requested: AtomicBool,
    transition: tokio::sync::Mutex<()>,
}

impl ServiceWorker {
    pub fn new(config: WorkerConfig, store: Arc<dyn PartitionStore>, fetcher: Arc<dyn Fetcher>) -> Result<Self, Error> {
        let names = PartitionNames::for_version(&config.version);
        let manifest = Manifest::resolve(&config.origin, &config.static_assets)?;
        let fallback = config
            .fallback_asset
            .as_deref()
            .map(|asset| resolve(asset, &config.origin).map(|url| RequestKey::get(&url)))
            .transpose()?;
        let resolver = Resolver::new(store.clone(), fetcher.clone(), names.clone(), fallback, config.timeout);

        Ok(Self {
            config,
            names,
            manifest,
            registry: CacheRegistry::new(store),
            resolver,
            fetcher,
            state: RwLock::new(WorkerState::Parsed),
            skip_waiting_requested: AtomicBool::new(false),
            transition: tokio::sync::Mutex::new(()),
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn names(&self) -> &PartitionNames {
        &self.names
    }

    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: WorkerState) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let previous = *state;
        *state = next;
        tracing::info!(version = %self.config.version, from = %previous, to = %next, "worker state");
    }

    /// Whether activation should follow install without waiting.
    pub fn skip_waiting(&self) -> bool {
        self.config.skip_waiting || self.skip_waiting_requested.load(Ordering::SeqCst)
    }

    pub async fn dispatch(&self, signal: Signal) -> Result<Outcome, Error> {
        match signal {
            Signal::Install => self.install().await,
            Signal::Activate => self.activate().await,
            Signal::Message(message) => Ok(self.message(message)),
            Signal::Fetch(request) => self.fetch(&request).await,
        }
    }

    /// Precache the manifest. A failure returns the worker to `Parsed` so the
    /// host can retry the whole install.
    pub async fn install(&self) -> Result<Outcome, Error> {
        let _transition = self.transition.lock().await;

        let state = self.state();
        if state != WorkerState::Parsed {
            return Err(Error::InvalidState(format!("install not accepted while {state}")));
        }
        self.set_state(WorkerState::Installing);

        let populated = self
            .registry
            .populate(&self.names.static_name, &self.manifest, self.fetcher.clone(), self.config.timeout)
            .await;

        let assets = match populated {
            Ok(assets) => assets,
            Err(e) => {
                tracing::warn!(version = %self.config.version, error = %e, "install failed");
                self.set_state(WorkerState::Parsed);
                return Err(e);
            }
        };

        if let Err(e) = self.registry.open_or_create(&self.names.runtime_name).await {
            tracing::warn!(partition = %self.names.runtime_name, error = %e, "runtime partition not created");
        }

        self.set_state(WorkerState::Installed);
        Ok(Outcome::Installed { partition: self.names.static_name.clone(), assets, skip_waiting: self.skip_waiting() })
    }

    /// Resume a version that already finished activating against this store.
    ///
    /// Returns true when the worker moved straight to `Activated`: the store
    /// records this version as activated and its static partition still
    /// exists. Nothing is fetched and the static partition is left untouched.
    pub async fn restore(&self) -> Result<bool, Error> {
        let _transition = self.transition.lock().await;

        if self.state() != WorkerState::Parsed {
            return Ok(false);
        }

        let store = self.registry.store();
        if store.activated_version().await?.as_deref() != Some(self.config.version.as_str()) {
            return Ok(false);
        }
        if !store.contains(&self.names.static_name).await? {
            tracing::warn!(partition = %self.names.static_name, "activated version lost its static partition");
            return Ok(false);
        }

        self.registry.open_or_create(&self.names.runtime_name).await?;
        self.set_state(WorkerState::Activated);
        Ok(true)
    }

    /// Purge stale partitions. Completes before any fetch is intercepted.
    pub async fn activate(&self) -> Result<Outcome, Error> {
        let _transition = self.transition.lock().await;

        let state = self.state();
        if state != WorkerState::Installed {
            return Err(Error::InvalidState(format!("activate not accepted while {state}")));
        }
        self.set_state(WorkerState::Activating);

        let purged = match self.purge_stale().await {
            Ok(purged) => purged,
            Err(e) => {
                self.set_state(WorkerState::Installed);
                return Err(e);
            }
        };

        if let Err(e) = self.registry.store().record_activation(&self.config.version).await {
            self.set_state(WorkerState::Installed);
            return Err(e);
        }

        self.set_state(WorkerState::Activated);
        Ok(Outcome::Activated { purged, claim_clients: self.config.claim_clients })
    }

    async fn purge_stale(&self) -> Result<Vec<String>, Error> {
        let all = self.registry.list_all().await?;
        self.registry.delete_if_stale(&all, &self.names).await
    }

    pub fn message(&self, message: WorkerMessage) -> Outcome {
        match message {
            WorkerMessage::SkipWaiting => {
                self.skip_waiting_requested.store(true, Ordering::SeqCst);
                tracing::info!(version = %self.config.version, "skip waiting requested");
                Outcome::SkipWaiting
            }
            WorkerMessage::Other(text) => {
                tracing::debug!(message = %text, "ignoring unknown message");
                Outcome::Ignored
            }
        }
    }

    pub async fn fetch(&self, request: &FetchRequest) -> Result<Outcome, Error> {
        if self.state() != WorkerState::Activated {
            return Ok(Outcome::Passthrough);
        }

        match select(request) {
            Route::Passthrough => Ok(Outcome::Passthrough),
            Route::Intercept(strategy) => {
                let delivery = self.resolver.resolve(strategy, request).await?;
                tracing::debug!(
                    url = %request.url,
                    strategy = strategy.as_str(),
                    source = delivery.source.as_str(),
                    status = delivery.response.status,
                    "fetch resolved"
                );
                Ok(Outcome::Response { strategy, delivery })
            }
        }
    }

    /// Read a request from the current version's partitions.
    pub async fn lookup(&self, key: &RequestKey) -> Result<Option<CapturedResponse>, Error> {
        self.resolver.lookup(key).await
    }

    /// Wait for background revalidations. Returns how many finished.
    pub async fn settle(&self) -> usize {
        self.resolver.settle().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::testing::ScriptedFetcher;
    use larder_core::{CacheDb, Destination, MemoryStore};

    const ORIGIN: &str = "https://agency.test";

    fn config(version: &str) -> WorkerConfig {
        WorkerConfig {
            version: version.to_string(),
            origin: Url::parse(ORIGIN).unwrap(),
            static_assets: vec!["/".into(), "/icon.svg".into()],
            fallback_asset: Some("/icon.svg".into()),
            timeout: Duration::from_secs(5),
            skip_waiting: false,
            claim_clients: true,
        }
    }

    fn site() -> Arc<ScriptedFetcher> {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond("https://agency.test/", 200, "<html></html>");
        fetcher.respond("https://agency.test/icon.svg", 200, "<svg/>");
        fetcher
    }

    fn get(path: &str) -> FetchRequest {
        FetchRequest::get(Url::parse(ORIGIN).unwrap().join(path).unwrap())
    }

    #[test]
    fn test_worker_config_from_app() {
        let app = AppConfig::default();
        let config = WorkerConfig::from_app(&app).unwrap();
        assert_eq!(config.version, "v1.1.0");
        assert_eq!(config.origin.as_str(), "http://localhost:5173/");
        assert!(config.skip_waiting);

        let bad = AppConfig { origin: "not a url".into(), ..Default::default() };
        assert!(matches!(WorkerConfig::from_app(&bad), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_message_parsing() {
        assert_eq!(WorkerMessage::from("SKIP_WAITING"), WorkerMessage::SkipWaiting);
        assert_eq!(WorkerMessage::from("skip_waiting"), WorkerMessage::Other("skip_waiting".into()));
    }

    #[tokio::test]
    async fn test_activation_gc_scenario() {
        let store: Arc<dyn PartitionStore> = Arc::new(CacheDb::open_in_memory().await.unwrap());
        let fetcher = site();

        let v1 = ServiceWorker::new(config("v1"), store.clone(), fetcher.clone()).unwrap();
        v1.dispatch(Signal::Install).await.unwrap();
        v1.dispatch(Signal::Activate).await.unwrap();
        assert_eq!(v1.registry().list_all().await.unwrap(), vec!["static:v1", "runtime:v1"]);

        let v2 = ServiceWorker::new(config("v2"), store.clone(), fetcher).unwrap();
        v2.dispatch(Signal::Install).await.unwrap();
        let outcome = v2.dispatch(Signal::Activate).await.unwrap();

        match outcome {
            Outcome::Activated { purged, claim_clients } => {
                assert_eq!(purged, vec!["static:v1", "runtime:v1"]);
                assert!(claim_clients);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(v2.registry().list_all().await.unwrap(), vec!["static:v2", "runtime:v2"]);
    }

    #[tokio::test]
    async fn test_install_reports_skip_waiting() {
        let worker = ServiceWorker::new(config("v1"), Arc::new(MemoryStore::new()), site()).unwrap();
        assert!(matches!(worker.dispatch(Signal::Message("SKIP_WAITING".into())).await.unwrap(), Outcome::SkipWaiting));

        match worker.dispatch(Signal::Install).await.unwrap() {
            Outcome::Installed { partition, assets, skip_waiting } => {
                assert_eq!(partition, "static:v1");
                assert_eq!(assets, 2);
                assert!(skip_waiting);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(worker.state(), WorkerState::Installed);
    }

    #[tokio::test]
    async fn test_failed_install_can_be_retried() {
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond("https://agency.test/", 200, "<html></html>");
        fetcher.fail("https://agency.test/icon.svg");
        let worker = ServiceWorker::new(config("v1"), store.clone(), fetcher.clone()).unwrap();

        assert!(matches!(worker.install().await, Err(Error::ManifestFailed(_))));
        assert_eq!(worker.state(), WorkerState::Parsed);
        assert!(store.list().await.unwrap().is_empty());

        fetcher.respond("https://agency.test/icon.svg", 200, "<svg/>");
        worker.install().await.unwrap();
        assert_eq!(worker.state(), WorkerState::Installed);
        assert_eq!(store.list().await.unwrap(), vec!["static:v1", "runtime:v1"]);
    }

    #[tokio::test]
    async fn test_signals_out_of_order_are_rejected() {
        let worker = ServiceWorker::new(config("v1"), Arc::new(MemoryStore::new()), site()).unwrap();
        assert!(matches!(worker.activate().await, Err(Error::InvalidState(_))));

        worker.install().await.unwrap();
        assert!(matches!(worker.install().await, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_fetch_passes_through_until_activated() {
        let fetcher = site();
        let worker = ServiceWorker::new(config("v1"), Arc::new(MemoryStore::new()), fetcher.clone()).unwrap();

        assert!(matches!(worker.fetch(&get("/icon.svg")).await.unwrap(), Outcome::Passthrough));
        worker.install().await.unwrap();
        assert!(matches!(worker.fetch(&get("/icon.svg")).await.unwrap(), Outcome::Passthrough));

        worker.activate().await.unwrap();
        let calls = fetcher.calls();
        match worker.fetch(&get("/icon.svg")).await.unwrap() {
            Outcome::Response { strategy, delivery } => {
                assert_eq!(strategy, Strategy::CacheFirst);
                assert_eq!(delivery.source, Source::Cache);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(fetcher.calls(), calls);
    }

    #[tokio::test]
    async fn test_non_get_fetch_passes_through() {
        let worker = ServiceWorker::new(config("v1"), Arc::new(MemoryStore::new()), site()).unwrap();
        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        let post = FetchRequest::new("POST", Url::parse("https://agency.test/api/contact").unwrap(), Destination::Other);
        assert!(matches!(worker.dispatch(Signal::Fetch(post)).await.unwrap(), Outcome::Passthrough));
    }

    #[tokio::test]
    async fn test_restart_serves_cache_without_network() {
        let store = Arc::new(MemoryStore::new());
        {
            let first = ServiceWorker::new(config("v1"), store.clone(), site()).unwrap();
            first.install().await.unwrap();
            first.activate().await.unwrap();
        }

        let offline = Arc::new(ScriptedFetcher::new());
        let worker = ServiceWorker::new(config("v1"), store.clone(), offline.clone()).unwrap();
        assert!(worker.restore().await.unwrap());
        assert_eq!(worker.state(), WorkerState::Activated);

        match worker.fetch(&get("/icon.svg")).await.unwrap() {
            Outcome::Response { delivery, .. } => {
                assert_eq!(delivery.source, Source::Cache);
                assert_eq!(delivery.response.body_text(), "<svg/>");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(offline.calls(), 0);
        assert!(matches!(worker.install().await, Err(Error::InvalidState(_))));
        assert_eq!(store.list().await.unwrap(), vec!["static:v1", "runtime:v1"]);
    }

    #[tokio::test]
    async fn test_restore_requires_matching_activation() {
        let store = Arc::new(MemoryStore::new());
        let v1 = ServiceWorker::new(config("v1"), store.clone(), site()).unwrap();
        v1.install().await.unwrap();
        assert!(!ServiceWorker::new(config("v1"), store.clone(), site()).unwrap().restore().await.unwrap());

        v1.activate().await.unwrap();
        assert_eq!(store.activated_version().await.unwrap().as_deref(), Some("v1"));

        let v2 = ServiceWorker::new(config("v2"), store.clone(), site()).unwrap();
        assert!(!v2.restore().await.unwrap());
        assert_eq!(v2.state(), WorkerState::Parsed);

        store.delete("static:v1").await.unwrap();
        let again = ServiceWorker::new(config("v1"), store.clone(), site()).unwrap();
        assert!(!again.restore().await.unwrap());
        assert_eq!(again.state(), WorkerState::Parsed);
    }

    #[tokio::test]
    async fn test_unknown_message_is_ignored() {
        let worker = ServiceWorker::new(config("v1"), Arc::new(MemoryStore::new()), site()).unwrap();
        assert!(matches!(worker.dispatch(Signal::Message("RELOAD".into())).await.unwrap(), Outcome::Ignored));
        assert!(!worker.skip_waiting());
    }
}
