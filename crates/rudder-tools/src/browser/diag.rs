// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use rudder_runs::RunError;

use super::{arg_str, map_err, Driver};
use crate::tool::{Tool, ToolCall};

const DEFAULT_LOG_LIMIT: usize = 40;

/// Page a slice of log entries: `(entries, hasMore, nextCursor)`.
fn page_slice<T: Clone>(all: &[T], cursor: usize, limit: usize) -> (Vec<T>, bool, usize) {
    let start = cursor.min(all.len());
    let end = (start + limit).min(all.len());
    let has_more = end < all.len();
    (all[start..end].to_vec(), has_more, end)
}

fn cursor_and_limit(args: &Value) -> (usize, usize) {
    let cursor = args.get("cursor").and_then(Value::as_u64).unwrap_or(0) as usize;
    let limit = args
        .get("limit")
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .max(1);
    (cursor, limit)
}

pub struct DialogInfoTool {
    driver: Driver,
}

impl DialogInfoTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for DialogInfoTool {
    fn name(&self) -> &str {
        "get_dialog_info"
    }

    fn description(&self) -> &str {
        "Report the modal dialog currently blocking the page, if any."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "sessionId": { "type": "string" } },
            "required": ["sessionId"],
        })
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let session = arg_str(&call.args, "sessionId")?;
        let dialog = self.driver.dialog_info(session).await.map_err(map_err)?;
        Ok(json!({ "dialog": dialog }))
    }
}

pub struct HandleDialogTool {
    driver: Driver,
}

impl HandleDialogTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for HandleDialogTool {
    fn name(&self) -> &str {
        "handle_dialog"
    }

    fn description(&self) -> &str {
        "Accept or dismiss the open dialog; promptText fills a prompt() box."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sessionId": { "type": "string" },
                "accept": { "type": "boolean" },
                "promptText": { "type": "string" },
            },
            "required": ["sessionId", "accept"],
        })
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let session = arg_str(&call.args, "sessionId")?;
        let accept = call
            .args
            .get("accept")
            .and_then(Value::as_bool)
            .ok_or_else(|| RunError::invalid_parameter("accept", "expected boolean"))?;
        let text = call.args.get("promptText").and_then(Value::as_str);
        self.driver
            .handle_dialog(session, accept, text)
            .await
            .map_err(map_err)?;
        Ok(json!({ "handled": true, "accepted": accept }))
    }
}

pub struct GetConsoleLogsTool {
    driver: Driver,
}

impl GetConsoleLogsTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for GetConsoleLogsTool {
    fn name(&self) -> &str {
        "get_console_logs"
    }

    fn description(&self) -> &str {
        "Console output captured for the session, paged via cursor/limit."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sessionId": { "type": "string" },
                "cursor": { "type": "integer" },
                "limit": { "type": "integer" },
            },
            "required": ["sessionId"],
        })
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let session = arg_str(&call.args, "sessionId")?;
        let (cursor, limit) = cursor_and_limit(&call.args);
        let all = self.driver.console_logs(session).await.map_err(map_err)?;
        let (entries, has_more, next) = page_slice(&all, cursor, limit);
        Ok(json!({ "entries": entries, "hasMore": has_more, "cursor": next }))
    }
}

pub struct GetNetworkLogsTool {
    driver: Driver,
}

impl GetNetworkLogsTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for GetNetworkLogsTool {
    fn name(&self) -> &str {
        "get_network_logs"
    }

    fn description(&self) -> &str {
        "Network requests observed for the session, paged via cursor/limit."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sessionId": { "type": "string" },
                "cursor": { "type": "integer" },
                "limit": { "type": "integer" },
            },
            "required": ["sessionId"],
        })
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let session = arg_str(&call.args, "sessionId")?;
        let (cursor, limit) = cursor_and_limit(&call.args);
        let all = self.driver.network_logs(session).await.map_err(map_err)?;
        let (entries, has_more, next) = page_slice(&all, cursor, limit);
        Ok(json!({ "entries": entries, "hasMore": has_more, "cursor": next }))
    }
}

pub struct DownloadsTool {
    driver: Driver,
}

impl DownloadsTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for DownloadsTool {
    fn name(&self) -> &str {
        "get_downloads"
    }

    fn description(&self) -> &str {
        "List downloads started by the session with their current state."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "sessionId": { "type": "string" } },
            "required": ["sessionId"],
        })
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let session = arg_str(&call.args, "sessionId")?;
        let downloads = self.driver.downloads(session).await.map_err(map_err)?;
        Ok(json!({ "downloads": downloads }))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_slice_reports_has_more_and_cursor() {
        let all: Vec<u32> = (0..10).collect();
        let (page, more, next) = page_slice(&all, 0, 4);
        assert_eq!(page, vec![0, 1, 2, 3]);
        assert!(more);
        assert_eq!(next, 4);

        let (page, more, next) = page_slice(&all, 8, 4);
        assert_eq!(page, vec![8, 9]);
        assert!(!more);
        assert_eq!(next, 10);
    }

    #[test]
    fn page_slice_cursor_past_end_is_empty() {
        let all: Vec<u32> = (0..3).collect();
        let (page, more, _) = page_slice(&all, 50, 4);
        assert!(page.is_empty());
        assert!(!more);
    }
}
