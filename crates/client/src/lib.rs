//! Client side of larder.
//!
//! This crate provides the network fetcher, the offline cache worker that
//! sits between a host and the network, and the CORS relay gateway.

pub mod fetch;
pub mod relay;
pub mod worker;

pub use fetch::{FetchConfig, Fetcher, HttpFetcher, UrlError, canonicalize, resolve};
pub use relay::{OriginPolicy, RelayConfig, RelayGateway, RelayPayload, RelayRequest, RelayResponse};
pub use worker::{
    CacheRegistry, Delivery, Manifest, Outcome, PartitionNames, Route, ServiceWorker, Signal, Source, Strategy,
    WorkerConfig, WorkerMessage, WorkerState, select,
};
