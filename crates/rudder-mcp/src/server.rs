// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! [`RudderMcpServer`] — the rmcp [`ServerHandler`] implementation.
//!
//! Wraps the shared [`ToolRegistry`] and implements the MCP `tools/list`
//! and `tools/call` protocol methods; all other lifecycle methods use the
//! rmcp defaults.  The handler itself is stateless — browser sessions and
//! runs live behind the tools, addressed by the ids the tools return.

use std::sync::Arc;

use rmcp::{
    handler::server::ServerHandler,
    model::{
        CallToolRequestParams, CallToolResult, ListToolsResult, PaginatedRequestParams,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    ErrorData as McpError,
};
use uuid::Uuid;

use rudder_tools::{ToolCall, ToolRegistry};

use crate::bridge::{output_to_call_result, schema_to_mcp_tool};

/// Rudder MCP server — create with [`RudderMcpServer::new`], then call
/// [`rmcp::ServiceExt::serve`] to attach a transport.
#[derive(Clone)]
pub struct RudderMcpServer {
    registry: Arc<ToolRegistry>,
}

impl RudderMcpServer {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }
}

impl ServerHandler for RudderMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..ServerInfo::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let registry = self.registry.clone();
        async move {
            let tools = registry
                .schemas()
                .into_iter()
                .map(schema_to_mcp_tool)
                .collect();
            Ok(ListToolsResult {
                tools,
                next_cursor: None,
                meta: None,
            })
        }
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let args = request
            .arguments
            .map(|m| serde_json::Value::Object(m.into_iter().collect()))
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        let call = ToolCall::new(Uuid::new_v4().to_string(), request.name.to_string(), args);
        // The registry is the safety envelope: failures come back as error
        // outputs, never as protocol faults.
        let output = self.registry.execute(&call).await;
        Ok(output_to_call_result(output))
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
