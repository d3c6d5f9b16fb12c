//! cache_get tool implementation.
//!
//! Reads one request from the current version's partitions without touching
//! the network.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use larder_client::{ServiceWorker, fetch::parse_request_url};
use larder_core::{Error, RequestKey};

use crate::tools::{ResponseView, json_result};

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Absolute URL, or a path resolved against the configured origin.
    pub url: String,

    /// HTTP method of the cached request (default: GET).
    #[serde(default)]
    pub method: Option<String>,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    /// Request identity, e.g. `GET https://example.com/`.
    pub key: String,
    pub entry: ResponseView,
}

pub async fn get_impl(worker: &ServiceWorker, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let url = parse_request_url(&params.url, &worker.config().origin).map_err(Error::from)?;
    let key = RequestKey::new(params.method.as_deref().unwrap_or("GET"), &url);

    let entry = worker.lookup(&key).await?.ok_or_else(|| Error::CacheMiss(key.to_string()))?;

    let output = CacheGetOutput { key: key.to_string(), entry: ResponseView::from(&entry) };
    json_result(&output)
}
