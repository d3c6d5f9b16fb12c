//! sw_fetch tool implementation.
//!
//! Delivers one fetch to the worker and reports how it was resolved.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use larder_client::{Outcome, ServiceWorker, Signal, fetch::parse_request_url};
use larder_core::{Destination, FetchRequest};

use super::{ResponseView, json_result};
use crate::error::ToolError;

/// Input parameters for sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchParams {
    /// Absolute URL, or a path resolved against the configured origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default)]
    pub method: Option<String>,

    /// Request destination: image, font, style, script or other.
    /// Inferred from the URL extension when absent.
    #[serde(default)]
    pub destination: Option<Destination>,
}

/// Output structure for sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchOutput {
    /// The request URL after resolution.
    pub url: String,
    /// False when the worker declined and the host should fetch normally.
    pub handled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    /// cache, network or fallback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseView>,
}

pub async fn fetch_impl(worker: &ServiceWorker, params: FetchParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(ToolError::InvalidInput("url cannot be empty".into()).into());
    }

    let url = parse_request_url(&params.url, &worker.config().origin).map_err(larder_core::Error::from)?;
    let method = params.method.as_deref().unwrap_or("GET");
    let destination = params.destination.unwrap_or_else(|| Destination::infer(&url));
    let request = FetchRequest::new(method, url, destination);

    let output = match worker.dispatch(Signal::Fetch(request.clone())).await? {
        Outcome::Response { strategy, delivery } => FetchOutput {
            url: request.url.to_string(),
            handled: true,
            strategy: Some(strategy.as_str().to_string()),
            source: Some(delivery.source.as_str().to_string()),
            response: Some(ResponseView::from(&delivery.response)),
        },
        _ => FetchOutput { url: request.url.to_string(), handled: false, strategy: None, source: None, response: None },
    };

    json_result(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{config_for, site, state_with};
    use crate::tools::lifecycle::install_impl;
    use crate::tools::output_json;

    fn params(url: &str) -> FetchParams {
        FetchParams { url: url.to_string(), method: None, destination: None }
    }

    #[tokio::test]
    async fn test_fetch_before_install_passes_through() {
        let server = site().await;
        let state = state_with(config_for(&server)).await;

        let json = output_json(&fetch_impl(&state.worker, params("/favicon.svg")).await.unwrap());
        assert_eq!(json["handled"], false);
        assert!(json.get("response").is_none());
    }

    #[tokio::test]
    async fn test_fetch_precached_icon_from_cache() {
        let server = site().await;
        let state = state_with(config_for(&server)).await;
        install_impl(&state.worker).await.unwrap();

        let json = output_json(&fetch_impl(&state.worker, params("/favicon.svg")).await.unwrap());
        assert_eq!(json["handled"], true);
        assert_eq!(json["strategy"], "cache_first");
        assert_eq!(json["source"], "cache");
        assert_eq!(json["response"]["body"], "<svg/>");
    }

    #[tokio::test]
    async fn test_fetch_stylesheet_from_network_then_cache() {
        let server = site().await;
        let state = state_with(config_for(&server)).await;
        install_impl(&state.worker).await.unwrap();

        let url = format!("{}/src/app.css", server.url());
        let first = output_json(&fetch_impl(&state.worker, params(&url)).await.unwrap());
        assert_eq!(first["strategy"], "stale_while_revalidate");
        assert_eq!(first["source"], "network");

        state.worker.settle().await;
        let second = output_json(&fetch_impl(&state.worker, params(&url)).await.unwrap());
        assert_eq!(second["source"], "cache");
        assert_eq!(second["response"]["content_type"], "text/css");
    }

    #[tokio::test]
    async fn test_post_passes_through() {
        let server = site().await;
        let state = state_with(config_for(&server)).await;
        install_impl(&state.worker).await.unwrap();

        let params = FetchParams { url: "/api/contact".into(), method: Some("post".into()), destination: None };
        let json = output_json(&fetch_impl(&state.worker, params).await.unwrap());
        assert_eq!(json["handled"], false);
    }

    #[tokio::test]
    async fn test_empty_url_rejected() {
        let server = site().await;
        let state = state_with(config_for(&server)).await;

        let err = fetch_impl(&state.worker, params("  ")).await.unwrap_err();
        assert_eq!(err.code.0, -32602);
    }
}
