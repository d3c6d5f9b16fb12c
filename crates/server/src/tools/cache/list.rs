//! cache_list tool implementation.
//!
//! Lists every tracked partition with its entry count.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use larder_client::ServiceWorker;

use crate::tools::json_result;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PartitionSummary {
    pub name: String,
    pub entries: usize,
    /// Owned by the running version.
    pub current: bool,
}

/// Output from the cache_list tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheListOutput {
    pub version: String,
    pub state: String,
    pub partitions: Vec<PartitionSummary>,
}

pub async fn list_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    let registry = worker.registry();
    let mut partitions = Vec::new();

    for name in registry.list_all().await? {
        let entries = registry.partition(&name).keys().await?.len();
        let current = worker.names().contains(&name);
        partitions.push(PartitionSummary { name, entries, current });
    }

    let output = CacheListOutput { version: worker.config().version.clone(), state: worker.state().to_string(), partitions };
    json_result(&output)
}
