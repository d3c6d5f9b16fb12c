//! relay_forward tool implementation.
//!
//! Passes one browser request through the CORS relay gateway.

use std::collections::BTreeMap;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use larder_client::{RelayGateway, RelayPayload, RelayRequest};

use super::json_result;

/// Input parameters for relay_forward tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RelayForwardParams {
    /// Method of the browser request itself; OPTIONS answers a preflight (default: POST).
    #[serde(default = "default_request_method")]
    pub request_method: String,

    /// `Origin` header of the browser request.
    #[serde(default)]
    pub origin: Option<String>,

    /// Upstream URL.
    #[serde(default)]
    pub url: Option<String>,

    /// Upstream method (default: POST).
    #[serde(default)]
    pub method: Option<String>,

    /// Headers sent upstream.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// JSON body sent upstream; `{}` when absent, omitted for GET.
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

fn default_request_method() -> String {
    "POST".into()
}

pub async fn relay_impl(relay: &RelayGateway, params: RelayForwardParams) -> Result<CallToolResult, McpError> {
    let request = RelayRequest {
        method: params.request_method,
        origin: params.origin,
        payload: RelayPayload { url: params.url, method: params.method, headers: params.headers, body: params.body },
    };

    let response = relay.handle(request).await;
    json_result(&response)
}
