//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.

use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

use larder_core::store::ContactSubmission;

use crate::state::AppState;
use crate::tools::{
    backup::{self, BackupRemoveParams},
    cache::{self, CacheGetParams},
    fetch::{FetchParams, fetch_impl},
    lifecycle::{MessageParams, activate_impl, install_impl, message_impl, settle_impl},
    relay::{RelayForwardParams, relay_impl},
};

/// The main MCP server handler for larder.
#[derive(Clone)]
pub struct LarderServer {
    tool_router: ToolRouter<Self>,
    state: Arc<AppState>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl LarderServer {
    /// Create a new server handler.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { tool_router: Self::tool_router(), state }
    }

    #[tool(
        description = "Install the current version: precache the static manifest into static:<version>. All assets must load or nothing is committed. Activates immediately when skip-waiting applies."
    )]
    async fn sw_install(&self) -> Result<CallToolResult, McpError> {
        install_impl(&self.state.worker).await
    }

    #[tool(description = "Activate the installed version: delete every partition not owned by it.")]
    async fn sw_activate(&self) -> Result<CallToolResult, McpError> {
        activate_impl(&self.state.worker).await
    }

    #[tool(description = "Post a message to the worker. SKIP_WAITING activates an installed worker right away.")]
    async fn sw_message(&self, params: Parameters<MessageParams>) -> Result<CallToolResult, McpError> {
        message_impl(&self.state.worker, params.0).await
    }

    #[tool(
        description = "Fetch a URL through the worker. Images and fonts are cache-first, styles and scripts stale-while-revalidate, everything else network-first. Non-GET requests pass through."
    )]
    async fn sw_fetch(&self, params: Parameters<FetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.state.worker, params.0).await
    }

    #[tool(description = "Wait for background revalidations to finish writing.")]
    async fn sw_settle(&self) -> Result<CallToolResult, McpError> {
        settle_impl(&self.state.worker).await
    }

    #[tool(description = "List every cache partition with entry counts.")]
    async fn cache_list(&self) -> Result<CallToolResult, McpError> {
        cache::list_impl(&self.state.worker).await
    }

    #[tool(description = "Read a cached response for a URL from the current partitions. No network access.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        cache::get_impl(&self.state.worker, params.0).await
    }

    #[tool(
        description = "Forward a browser request through the CORS relay. Checks origin and target host allow-lists and returns the upstream status and body with CORS headers."
    )]
    async fn relay_forward(&self, params: Parameters<RelayForwardParams>) -> Result<CallToolResult, McpError> {
        relay_impl(&self.state.relay, params.0).await
    }

    #[tool(description = "Store a contact form submission locally. Only the newest backups are kept.")]
    async fn backup_save(&self, params: Parameters<ContactSubmission>) -> Result<CallToolResult, McpError> {
        backup::save_impl(&self.state.db, self.state.config.backup_limit, params.0).await
    }

    #[tool(description = "List stored contact form backups, oldest first.")]
    async fn backup_list(&self) -> Result<CallToolResult, McpError> {
        backup::list_impl(&self.state.db).await
    }

    #[tool(description = "Delete one contact form backup by key.")]
    async fn backup_remove(&self, params: Parameters<BackupRemoveParams>) -> Result<CallToolResult, McpError> {
        backup::remove_impl(&self.state.db, params.0).await
    }
}

impl ServerHandler for LarderServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "larder".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
