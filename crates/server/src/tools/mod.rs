//! MCP tool implementations.
//!
//! This module contains all tools exposed by the larder server.

use std::collections::BTreeMap;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use larder_core::CapturedResponse;

use crate::error::ToolError;

pub mod backup;
pub mod cache;
pub mod fetch;
pub mod lifecycle;
pub mod relay;

/// A captured response as returned to the host.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResponseView {
    /// URL the response was served from.
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub headers: BTreeMap<String, String>,
    /// Body as UTF-8 text; absent for binary bodies.
    pub body: Option<String>,
    pub body_bytes: usize,
    /// When the response was captured (RFC 3339).
    pub captured_at: String,
}

impl From<&CapturedResponse> for ResponseView {
    fn from(response: &CapturedResponse) -> Self {
        Self {
            url: response.url.clone(),
            status: response.status,
            content_type: response.content_type().map(String::from),
            headers: response.headers.clone(),
            body: std::str::from_utf8(&response.body).ok().map(String::from),
            body_bytes: response.body.len(),
            captured_at: response.captured_at.clone(),
        }
    }
}

/// Serialize a tool output as the single text content of a successful result.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output).map_err(|e| ToolError::Output(e.to_string()))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
pub(crate) fn output_json(result: &CallToolResult) -> serde_json::Value {
    let text = result.content.first().and_then(|c| c.as_text()).map(|t| t.text.clone()).unwrap();
    serde_json::from_str(&text).unwrap()
}
