//! In-process [`PartitionStore`].
//!
//! Uses a HashMap behind a tokio RwLock. Nothing survives the process, so this
//! is meant for tests and for hosts that only need an accelerator for the
//! current session.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{PartitionStore, RequestKey};
use crate::Error;
use crate::model::CapturedResponse;

struct Partition {
    seq: u64,
    /// key hash -> (key, response, write sequence)
    entries: HashMap<String, (RequestKey, CapturedResponse, u64)>,
}

#[derive(Default)]
struct Inner {
    next_seq: u64,
    partitions: HashMap<String, Partition>,
    activated: Option<String>,
}

impl Inner {
    fn next(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn open(&mut self, name: &str) -> &mut Partition {
        let next_seq = &mut self.next_seq;
        self.partitions.entry(name.to_string()).or_insert_with(|| {
            *next_seq += 1;
            Partition { seq: *next_seq, entries: HashMap::new() }
        })
    }
}

/// Partitions held in memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PartitionStore for MemoryStore {
    async fn open(&self, name: &str) -> Result<(), Error> {
        self.inner.write().await.open(name);
        Ok(())
    }

    async fn contains(&self, name: &str) -> Result<bool, Error> {
        Ok(self.inner.read().await.partitions.contains_key(name))
    }

    async fn list(&self) -> Result<Vec<String>, Error> {
        let inner = self.inner.read().await;
        let mut names: Vec<(&String, u64)> = inner.partitions.iter().map(|(name, p)| (name, p.seq)).collect();
        names.sort_by_key(|(_, seq)| *seq);
        Ok(names.into_iter().map(|(name, _)| name.clone()).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        Ok(self.inner.write().await.partitions.remove(name).is_some())
    }

    async fn read(&self, partition: &str, key: &RequestKey) -> Result<Option<CapturedResponse>, Error> {
        let inner = self.inner.read().await;
        Ok(inner
            .partitions
            .get(partition)
            .and_then(|p| p.entries.get(&key.hash()))
            .map(|(_, response, _)| response.clone()))
    }

    async fn write(&self, partition: &str, key: &RequestKey, response: &CapturedResponse) -> Result<(), Error> {
        let mut inner = self.inner.write().await;
        let seq = inner.next();
        let part = inner.open(partition);
        part.entries.insert(key.hash(), (key.clone(), response.clone(), seq));
        Ok(())
    }

    async fn commit(&self, partition: &str, entries: Vec<(RequestKey, CapturedResponse)>) -> Result<(), Error> {
        let mut inner = self.inner.write().await;
        let mut staged = HashMap::with_capacity(entries.len());
        for (key, response) in entries {
            let seq = inner.next();
            staged.insert(key.hash(), (key, response, seq));
        }
        inner.open(partition).entries = staged;
        Ok(())
    }

    async fn keys(&self, partition: &str) -> Result<Vec<RequestKey>, Error> {
        let inner = self.inner.read().await;
        let Some(part) = inner.partitions.get(partition) else {
            return Ok(Vec::new());
        };
        let mut keys: Vec<&(RequestKey, CapturedResponse, u64)> = part.entries.values().collect();
        keys.sort_by_key(|(_, _, seq)| *seq);
        Ok(keys.into_iter().map(|(key, _, _)| key.clone()).collect())
    }

    async fn activated_version(&self) -> Result<Option<String>, Error> {
        Ok(self.inner.read().await.activated.clone())
    }

    async fn record_activation(&self, version: &str) -> Result<(), Error> {
        self.inner.write().await.activated = Some(version.to_string());
        Ok(())
    }
}
