// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! `rudder-mcp` — tool protocol server for rudder.
//!
//! Exposes the orchestrator's uniform tool catalog (browser ops, task ops,
//! composites) to any MCP-compatible host over **stdio** transport.
//!
//! # Quick start
//!
//! ```text
//! rudder serve mcp
//! ```
//!
//! # Architecture
//!
//! ```text
//! MCP client (agent host)
//!       │  stdin/stdout (line-delimited JSON-RPC)
//!       ▼
//! RudderMcpServer (rmcp ServerHandler)
//!       │
//!       ▼
//! ToolRegistry  ──►  Tool::execute()
//! ```

mod bridge;
mod server;

pub use bridge::{output_to_call_result, schema_to_mcp_tool};
pub use server::RudderMcpServer;

use std::sync::Arc;

use anyhow::Result;
use rmcp::ServiceExt;

use rudder_tools::ToolRegistry;

/// Start the stdio server and block until the client disconnects (stdin
/// EOF) or the process is terminated.
pub async fn serve_stdio(registry: Arc<ToolRegistry>) -> Result<()> {
    let server = RudderMcpServer::new(registry);
    let running = server
        .serve((tokio::io::stdin(), tokio::io::stdout()))
        .await
        .map_err(|e| anyhow::anyhow!("MCP server init error: {e}"))?;
    running
        .waiting()
        .await
        .map_err(|e| anyhow::anyhow!("MCP server error: {e}"))?;
    Ok(())
}
