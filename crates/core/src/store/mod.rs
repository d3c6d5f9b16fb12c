//! Named partitions of captured responses.
//!
//! A partition is a durable key-value area: key = normalized request identity,
//! value = a response snapshot. The worker talks to partitions only through
//! [`PartitionStore`], which has two implementations:
//!
//! - [`CacheDb`]: SQLite via tokio-rusqlite, WAL mode, schema migrations
//! - [`MemoryStore`]: in-process maps, for tests and ephemeral hosts
//!
//! Each individual read or write is atomic. `commit` additionally replaces a
//! whole partition in one step, which is what manifest installs rely on.
//!
//! The store also keeps the version that last finished activating, so a worker
//! restarted on the same store can resume without a network install.

pub mod backups;
pub mod connection;
pub mod key;
pub mod memory;
pub mod migrations;
pub mod partitions;

use async_trait::async_trait;

pub use crate::Error;
use crate::model::CapturedResponse;

pub use backups::{ContactSubmission, FormBackup};
pub use connection::CacheDb;
pub use key::RequestKey;
pub use memory::MemoryStore;

/// Storage primitive behind the partition registry.
#[async_trait]
pub trait PartitionStore: Send + Sync {
    /// Create the partition if it does not exist. Idempotent.
    async fn open(&self, name: &str) -> Result<(), Error>;

    async fn contains(&self, name: &str) -> Result<bool, Error>;

    /// Every tracked partition name, oldest first, regardless of version.
    async fn list(&self) -> Result<Vec<String>, Error>;

    /// Delete a partition and all its entries. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool, Error>;

    /// Read one entry. A missing partition reads as a miss.
    async fn read(&self, partition: &str, key: &RequestKey) -> Result<Option<CapturedResponse>, Error>;

    /// Write one entry, creating the partition if needed. Last write wins.
    async fn write(&self, partition: &str, key: &RequestKey, response: &CapturedResponse) -> Result<(), Error>;

    /// Replace the partition's contents with exactly `entries`, all or nothing.
    async fn commit(&self, partition: &str, entries: Vec<(RequestKey, CapturedResponse)>) -> Result<(), Error>;

    /// Keys stored in a partition, in write order. Empty if absent.
    async fn keys(&self, partition: &str) -> Result<Vec<RequestKey>, Error>;

    /// Version whose activation was recorded last, if any.
    async fn activated_version(&self) -> Result<Option<String>, Error>;

    /// Record `version` as activated, replacing any earlier record.
    async fn record_activation(&self, version: &str) -> Result<(), Error>;
}
