//! Versioned partition registry.
//!
//! Owns the `static:<version>` and `runtime:<version>` partitions, builds the
//! static one from the manifest at install time and purges superseded ones at
//! activation.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use url::Url;

use larder_core::{CapturedResponse, Error, FetchRequest, PartitionStore, RequestKey};

use super::strategy::fetch_bounded;
use crate::fetch::{Fetcher, resolve};

const STATIC_PREFIX: &str = "static";
const RUNTIME_PREFIX: &str = "runtime";

/// The two partition names owned by one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionNames {
    pub static_name: String,
    pub runtime_name: String,
}

impl PartitionNames {
    pub fn for_version(version: &str) -> Self {
        Self {
            static_name: format!("{STATIC_PREFIX}:{version}"),
            runtime_name: format!("{RUNTIME_PREFIX}:{version}"),
        }
    }

    /// Both names, static first. This is also the lookup order.
    pub fn all(&self) -> [&str; 2] {
        [self.static_name.as_str(), self.runtime_name.as_str()]
    }

    pub fn contains(&self, name: &str) -> bool {
        self.all().contains(&name)
    }
}

/// Resolved list of assets precached at install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    urls: Vec<Url>,
}

impl Manifest {
    /// Resolve manifest entries against `origin`. Duplicates are dropped,
    /// first occurrence wins.
    pub fn resolve(origin: &Url, assets: &[String]) -> Result<Self, Error> {
        let mut urls: Vec<Url> = Vec::with_capacity(assets.len());
        for asset in assets {
            let url = resolve(asset, origin)?;
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
        Ok(Self { urls })
    }

    pub fn urls(&self) -> &[Url] {
        &self.urls
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// Handle to one named partition.
#[derive(Clone)]
pub struct Partition {
    name: String,
    store: Arc<dyn PartitionStore>,
}

impl Partition {
    pub async fn get(&self, key: &RequestKey) -> Result<Option<CapturedResponse>, Error> {
        self.store.read(&self.name, key).await
    }

    pub async fn put(&self, key: &RequestKey, response: &CapturedResponse) -> Result<(), Error> {
        self.store.write(&self.name, key, response).await
    }

    pub async fn keys(&self) -> Result<Vec<RequestKey>, Error> {
        self.store.keys(&self.name).await
    }
}

/// Creates, enumerates and deletes partitions on top of a [`PartitionStore`].
#[derive(Clone)]
pub struct CacheRegistry {
    store: Arc<dyn PartitionStore>,
}

impl CacheRegistry {
    pub fn new(store: Arc<dyn PartitionStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn PartitionStore> {
        &self.store
    }

    /// Open a partition, creating it if absent. Idempotent.
    pub async fn open_or_create(&self, name: &str) -> Result<Partition, Error> {
        self.store.open(name).await?;
        Ok(self.partition(name))
    }

    /// Handle to a partition without creating it.
    pub fn partition(&self, name: &str) -> Partition {
        Partition { name: name.to_string(), store: self.store.clone() }
    }

    /// Every tracked partition, oldest first, regardless of version.
    pub async fn list_all(&self) -> Result<Vec<String>, Error> {
        self.store.list().await
    }

    /// Delete every name in `names` that is not in `keep`. Returns the
    /// deleted names.
    pub async fn delete_if_stale(&self, names: &[String], keep: &PartitionNames) -> Result<Vec<String>, Error> {
        let mut deleted = Vec::new();
        for name in names.iter().filter(|name| !keep.contains(name)) {
            if self.store.delete(name).await? {
                tracing::info!(partition = %name, "deleted stale partition");
                deleted.push(name.clone());
            }
        }
        Ok(deleted)
    }

    /// Fetch every manifest URL and commit the responses as partition `name`.
    ///
    /// All fetches run concurrently. Any failure or non-2xx response aborts
    /// the rest and nothing is written; on success the partition and all its
    /// entries appear in a single commit. Returns the number of entries.
    pub async fn populate(
        &self, name: &str, manifest: &Manifest, fetcher: Arc<dyn Fetcher>, timeout: Duration,
    ) -> Result<usize, Error> {
        let mut join_set = JoinSet::new();

        for (index, url) in manifest.urls().iter().cloned().enumerate() {
            let fetcher = fetcher.clone();
            join_set.spawn(async move {
                let request = FetchRequest::get(url);
                let result = fetch_bounded(fetcher.as_ref(), &request, timeout).await;
                (index, request, result)
            });
        }

        let mut staged: Vec<Option<(RequestKey, CapturedResponse)>> = vec![None; manifest.len()];

        while let Some(joined) = join_set.join_next().await {
            let outcome = match joined {
                Ok((index, request, Ok(response))) if response.is_ok() => {
                    staged[index] = Some((request.key(), response));
                    continue;
                }
                Ok((_, request, Ok(response))) => format!("{} returned status {}", request.url, response.status),
                Ok((_, request, Err(e))) => format!("{}: {}", request.url, e),
                Err(e) => format!("manifest fetch task failed: {e}"),
            };

            join_set.shutdown().await;
            tracing::warn!(partition = name, reason = %outcome, "manifest population aborted");
            return Err(Error::ManifestFailed(outcome));
        }

        let entries: Vec<(RequestKey, CapturedResponse)> = staged.into_iter().flatten().collect();
        let count = entries.len();
        self.store.commit(name, entries).await?;

        tracing::info!(partition = name, entries = count, "manifest committed");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::testing::ScriptedFetcher;
    use larder_core::{CacheDb, MemoryStore};

    fn origin() -> Url {
        Url::parse("https://agency.test").unwrap()
    }

    fn assets(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_partition_names() {
        let names = PartitionNames::for_version("v1.1.0");
        assert_eq!(names.all(), ["static:v1.1.0", "runtime:v1.1.0"]);
        assert!(names.contains("runtime:v1.1.0"));
        assert!(!names.contains("runtime:v1.0.0"));
    }

    #[test]
    fn test_manifest_resolves_and_dedupes() {
        let manifest = Manifest::resolve(&origin(), &assets(&["/", "/icon.svg", "/", "https://cdn.test/a.css"])).unwrap();
        let urls: Vec<&str> = manifest.urls().iter().map(Url::as_str).collect();
        assert_eq!(urls, vec!["https://agency.test/", "https://agency.test/icon.svg", "https://cdn.test/a.css"]);
    }

    #[test]
    fn test_manifest_rejects_bad_entry() {
        let result = Manifest::resolve(&origin(), &assets(&["/", "ftp://files.test/x"]));
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_open_or_create_is_idempotent() {
        let registry = CacheRegistry::new(Arc::new(MemoryStore::new()));
        let key = RequestKey::get(&Url::parse("https://agency.test/").unwrap());
        let response = CapturedResponse::new("https://agency.test/", 200, Default::default(), b"x".to_vec());

        let first = registry.open_or_create("runtime:v1").await.unwrap();
        first.put(&key, &response).await.unwrap();
        let second = registry.open_or_create("runtime:v1").await.unwrap();

        assert_eq!(registry.list_all().await.unwrap(), vec!["runtime:v1"]);
        assert_eq!(second.get(&key).await.unwrap(), Some(response));
    }

    #[tokio::test]
    async fn test_cold_install_holds_exactly_manifest_keys() {
        let registry = CacheRegistry::new(Arc::new(MemoryStore::new()));
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond("https://agency.test/", 200, "<html></html>");
        fetcher.respond("https://agency.test/icon.svg", 200, "<svg/>");
        let manifest = Manifest::resolve(&origin(), &assets(&["/", "/icon.svg"])).unwrap();

        let count = registry.populate("static:v1", &manifest, fetcher, Duration::from_secs(5)).await.unwrap();

        assert_eq!(count, 2);
        let keys: Vec<String> =
            registry.partition("static:v1").keys().await.unwrap().iter().map(|k| k.url().to_string()).collect();
        assert_eq!(keys, vec!["https://agency.test/", "https://agency.test/icon.svg"]);
    }

    #[tokio::test]
    async fn test_manifest_failure_leaves_partition_absent() {
        let store = Arc::new(CacheDb::open_in_memory().await.unwrap());
        let registry = CacheRegistry::new(store.clone());
        let fetcher = Arc::new(ScriptedFetcher::new());
        for path in ["/", "/a.css", "/b.js", "/c.png"] {
            fetcher.respond(&format!("https://agency.test{path}"), 200, "ok");
        }
        fetcher.fail("https://agency.test/d.woff2");
        let manifest = Manifest::resolve(&origin(), &assets(&["/", "/a.css", "/b.js", "/c.png", "/d.woff2"])).unwrap();

        let result = registry.populate("static:v1", &manifest, fetcher, Duration::from_secs(5)).await;

        assert!(matches!(result, Err(Error::ManifestFailed(_))));
        assert!(!store.contains("static:v1").await.unwrap());
        assert!(registry.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_manifest_non_2xx_fails_install() {
        let registry = CacheRegistry::new(Arc::new(MemoryStore::new()));
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond("https://agency.test/", 200, "ok");
        fetcher.respond("https://agency.test/manifest.webmanifest", 404, "nope");
        let manifest = Manifest::resolve(&origin(), &assets(&["/", "/manifest.webmanifest"])).unwrap();

        let result = registry.populate("static:v1", &manifest, fetcher, Duration::from_secs(5)).await;

        match result {
            Err(Error::ManifestFailed(reason)) => assert!(reason.contains("404")),
            other => panic!("expected manifest failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_if_stale_is_complete() {
        let registry = CacheRegistry::new(Arc::new(MemoryStore::new()));
        for name in ["static:v1", "runtime:v1", "static:v2", "runtime:v2", "legacy-images"] {
            registry.open_or_create(name).await.unwrap();
        }

        let all = registry.list_all().await.unwrap();
        let deleted = registry.delete_if_stale(&all, &PartitionNames::for_version("v2")).await.unwrap();

        assert_eq!(deleted, vec!["static:v1", "runtime:v1", "legacy-images"]);
        assert_eq!(registry.list_all().await.unwrap(), vec!["static:v2", "runtime:v2"]);
    }
}
