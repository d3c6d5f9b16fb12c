//! Fakes for worker tests: a scripted network and a store that rejects writes.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use larder_core::{CapturedResponse, Error, FetchRequest, MemoryStore, PartitionStore, RequestKey};

use crate::fetch::Fetcher;

#[derive(Clone)]
enum Reply {
    Respond { status: u16, body: String },
    Fail,
}

/// Network fake keyed by full URL. Unknown URLs fail like a dropped connection.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    replies: Mutex<HashMap<String, Reply>>,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
    delay: Option<Duration>,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every fetch waits for one `notify_one` on `gate` before answering.
    pub(crate) fn gated(gate: Arc<Notify>) -> Self {
        Self { gate: Some(gate), ..Self::default() }
    }

    /// Every fetch sleeps for `delay` before answering.
    pub(crate) fn delayed(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub(crate) fn respond(&self, url: &str, status: u16, body: &str) {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), Reply::Respond { status, body: body.to_string() });
    }

    pub(crate) fn fail(&self, url: &str) {
        self.replies.lock().unwrap().insert(url.to_string(), Reply::Fail);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<CapturedResponse, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self.replies.lock().unwrap().get(request.url.as_str()).cloned();
        match reply {
            Some(Reply::Respond { status, body }) => {
                let mut headers = BTreeMap::new();
                headers.insert("content-type".to_string(), "text/plain".to_string());
                Ok(CapturedResponse::new(request.url.as_str(), status, headers, body.into_bytes()))
            }
            Some(Reply::Fail) | None => Err(Error::Network(format!("connection refused: {}", request.url))),
        }
    }
}

/// Store whose writes always fail, as if the quota were exhausted.
#[derive(Clone, Default)]
pub(crate) struct FailingStore {
    inner: MemoryStore,
}

impl FailingStore {
    /// Seed an entry behind the failing write path.
    pub(crate) async fn seed(&self, partition: &str, key: &RequestKey, response: &CapturedResponse) {
        self.inner.write(partition, key, response).await.unwrap();
    }
}

#[async_trait]
impl PartitionStore for FailingStore {
    async fn open(&self, name: &str) -> Result<(), Error> {
        self.inner.open(name).await
    }

    async fn contains(&self, name: &str) -> Result<bool, Error> {
        self.inner.contains(name).await
    }

    async fn list(&self) -> Result<Vec<String>, Error> {
        self.inner.list().await
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        self.inner.delete(name).await
    }

    async fn read(&self, partition: &str, key: &RequestKey) -> Result<Option<CapturedResponse>, Error> {
        self.inner.read(partition, key).await
    }

    async fn write(&self, _partition: &str, _key: &RequestKey, _response: &CapturedResponse) -> Result<(), Error> {
        Err(Error::StorageFull("quota exceeded".into()))
    }

    async fn commit(&self, _partition: &str, _entries: Vec<(RequestKey, CapturedResponse)>) -> Result<(), Error> {
        Err(Error::StorageFull("quota exceeded".into()))
    }

    async fn keys(&self, partition: &str) -> Result<Vec<RequestKey>, Error> {
        self.inner.keys(partition).await
    }

    async fn activated_version(&self) -> Result<Option<String>, Error> {
        self.inner.activated_version().await
    }

    async fn record_activation(&self, version: &str) -> Result<(), Error> {
        self.inner.record_activation(version).await
    }
}

pub(crate) fn ok_response(url: &str, body: &str) -> CapturedResponse {
    CapturedResponse::new(url, 200, BTreeMap::new(), body.as_bytes().to_vec())
}
