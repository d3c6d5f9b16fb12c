//! Core types and shared functionality for larder.
//!
//! This crate provides:
//! - Partition stores (SQLite backend and in-memory)
//! - Request/response model shared by the worker and its host
//! - Unified error types
//! - Configuration structures

pub mod config;
pub mod error;
pub mod model;
pub mod store;

pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use model::{CapturedResponse, Destination, FetchRequest};
pub use store::{CacheDb, MemoryStore, PartitionStore, RequestKey};
