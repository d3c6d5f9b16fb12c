//! Delivery strategies.
//!
//! Each strategy resolves one request against the current version's
//! partitions and the network. Nothing is remembered between invocations
//! except what ends up in the partitions; the only shared state is the set of
//! background revalidations still in flight.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinSet;

use larder_core::{CapturedResponse, Error, FetchRequest, PartitionStore, RequestKey};

use super::registry::PartitionNames;
use super::selector::Strategy;
use crate::fetch::Fetcher;

/// Where a delivered response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Cache,
    Network,
    /// The configured fallback asset stood in for a failed fetch.
    Fallback,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Cache => "cache",
            Source::Network => "network",
            Source::Fallback => "fallback",
        }
    }
}

/// A resolved response.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub response: CapturedResponse,
    pub source: Source,
}

impl Delivery {
    fn cached(response: CapturedResponse) -> Self {
        Self { response, source: Source::Cache }
    }

    fn network(response: CapturedResponse) -> Self {
        Self { response, source: Source::Network }
    }
}

/// Fetch with the strategy timeout applied. A timeout is a network failure.
pub(crate) async fn fetch_bounded(
    fetcher: &dyn Fetcher, request: &FetchRequest, timeout: Duration,
) -> Result<CapturedResponse, Error> {
    match tokio::time::timeout(timeout, fetcher.fetch(request)).await {
        Ok(result) => result,
        Err(_) => Err(Error::FetchTimeout(format!("{} after {}ms", request.url, timeout.as_millis()))),
    }
}

/// Write a network response to the runtime partition.
///
/// Only 2xx responses are kept. Write failures are logged and swallowed.
async fn store_runtime(store: &dyn PartitionStore, partition: &str, key: &RequestKey, response: &CapturedResponse) {
    if !response.is_ok() {
        tracing::debug!(key = %key, status = response.status, "not caching non-2xx response");
        return;
    }

    if let Err(e) = store.write(partition, key, response).await {
        tracing::warn!(key = %key, partition, error = %e, "runtime cache write skipped");
    }
}

/// Runs the three strategies for one version.
pub struct Resolver {
    store: Arc<dyn PartitionStore>,
    fetcher: Arc<dyn Fetcher>,
    names: PartitionNames,
    fallback: Option<RequestKey>,
    timeout: Duration,
    background: Mutex<JoinSet<()>>,
}

impl Resolver {
    pub fn new(
        store: Arc<dyn PartitionStore>, fetcher: Arc<dyn Fetcher>, names: PartitionNames, fallback: Option<RequestKey>,
        timeout: Duration,
    ) -> Self {
        Self { store, fetcher, names, fallback, timeout, background: Mutex::new(JoinSet::new()) }
    }

    pub async fn resolve(&self, strategy: Strategy, request: &FetchRequest) -> Result<Delivery, Error> {
        match strategy {
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
            Strategy::NetworkFirst => self.network_first(request).await,
        }
    }

    /// Read `key` from the current static partition, then the runtime one.
    pub async fn lookup(&self, key: &RequestKey) -> Result<Option<CapturedResponse>, Error> {
        for partition in self.names.all() {
            if let Some(hit) = self.store.read(partition, key).await? {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    /// [`Self::lookup`] with storage errors read as misses.
    async fn cached(&self, key: &RequestKey) -> Option<CapturedResponse> {
        match self.lookup(key).await {
            Ok(hit) => {
                tracing::debug!(key = %key, hit = hit.is_some(), "cache lookup");
                hit
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<CapturedResponse, Error> {
        fetch_bounded(self.fetcher.as_ref(), request, self.timeout).await
    }

    pub async fn cache_first(&self, request: &FetchRequest) -> Result<Delivery, Error> {
        let key = request.key();

        if let Some(hit) = self.cached(&key).await {
            return Ok(Delivery::cached(hit));
        }

        match self.fetch(request).await {
            Ok(response) => {
                store_runtime(self.store.as_ref(), &self.names.runtime_name, &key, &response).await;
                Ok(Delivery::network(response))
            }
            Err(err) => {
                if let Some(fallback) = &self.fallback
                    && let Some(response) = self.cached(fallback).await
                {
                    tracing::debug!(key = %key, error = %err, "serving fallback asset");
                    return Ok(Delivery { response, source: Source::Fallback });
                }
                Err(err)
            }
        }
    }

    /// The fetch is spawned before the cache is read so both run at once.
    /// A hit is returned as soon as it is known and the fetch keeps going in
    /// the background; a miss waits for the fetch.
    pub async fn stale_while_revalidate(&self, request: &FetchRequest) -> Result<Delivery, Error> {
        let key = request.key();
        let (tx, rx) = oneshot::channel();

        let store = self.store.clone();
        let fetcher = self.fetcher.clone();
        let runtime = self.names.runtime_name.clone();
        let timeout = self.timeout;
        let background_request = request.clone();
        let background_key = key.clone();
        self.spawn(async move {
            let result = fetch_bounded(fetcher.as_ref(), &background_request, timeout).await;
            match &result {
                Ok(response) => store_runtime(store.as_ref(), &runtime, &background_key, response).await,
                Err(e) => tracing::debug!(key = %background_key, error = %e, "revalidation failed"),
            }
            // NOTE: the receiver is gone when the cache already answered
            let _ = tx.send(result);
        });

        if let Some(hit) = self.cached(&key).await {
            return Ok(Delivery::cached(hit));
        }

        match rx.await {
            Ok(result) => result.map(Delivery::network),
            Err(_) => Err(Error::Network(format!("revalidation of {} was cancelled", request.url))),
        }
    }

    pub async fn network_first(&self, request: &FetchRequest) -> Result<Delivery, Error> {
        let key = request.key();

        match self.fetch(request).await {
            Ok(response) => {
                store_runtime(self.store.as_ref(), &self.names.runtime_name, &key, &response).await;
                Ok(Delivery::network(response))
            }
            Err(err) => match self.cached(&key).await {
                Some(hit) => {
                    tracing::debug!(key = %key, error = %err, "network failed, serving cached");
                    Ok(Delivery::cached(hit))
                }
                None => Err(err),
            },
        }
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut background = self.background.lock().unwrap_or_else(PoisonError::into_inner);
        while background.try_join_next().is_some() {}
        background.spawn(task);
    }

    fn take_pending(&self) -> JoinSet<()> {
        std::mem::take(&mut *self.background.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Wait for every background revalidation. Returns how many finished.
    pub async fn settle(&self) -> usize {
        let mut settled = 0;
        loop {
            let mut pending = self.take_pending();
            if pending.is_empty() {
                return settled;
            }
            while let Some(joined) = pending.join_next().await {
                settled += 1;
                if let Err(e) = joined {
                    tracing::warn!(error = %e, "background revalidation task failed");
                }
            }
        }
    }
}
