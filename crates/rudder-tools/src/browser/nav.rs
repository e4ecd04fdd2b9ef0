// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use rudder_runs::RunError;

use super::{arg_str, do_navigate, map_err, page_info_value, Driver};
use crate::tool::{Tool, ToolCall};
use crate::urlcheck::UrlValidator;

/// Hard ceiling for the `wait` tool so a confused model cannot park a
/// session for minutes.
const MAX_WAIT_MS: u64 = 30_000;

pub struct NavigateTool {
    driver: Driver,
    validator: Arc<UrlValidator>,
}

impl NavigateTool {
    pub fn new(driver: Driver, validator: Arc<UrlValidator>) -> Self {
        Self { driver, validator }
    }
}

#[async_trait]
impl Tool for NavigateTool {
    fn name(&self) -> &str {
        "navigate"
    }

    fn description(&self) -> &str {
        "Navigate the active tab to a URL and return the page snapshot \
         (title, headings, interactive elements with stable ids).\n\n\
         URLs are validated before the browser sees them: only http/https \
         (file:// when enabled), private addresses rejected when the \
         block-private policy is on."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sessionId": { "type": "string" },
                "url": { "type": "string", "description": "Absolute URL to open" },
            },
            "required": ["sessionId", "url"],
        })
    }

    fn char_budget(&self) -> usize {
        6000
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let session = arg_str(&call.args, "sessionId")?;
        let url = arg_str(&call.args, "url")?;
        do_navigate(&self.driver, &self.validator, session, url).await
    }
}

pub struct GoBackTool {
    driver: Driver,
}

impl GoBackTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for GoBackTool {
    fn name(&self) -> &str {
        "go_back"
    }

    fn description(&self) -> &str {
        "Go back one entry in the active tab's history and return the new page snapshot."
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
        let info = self.driver.go_back(session).await.map_err(map_err)?;
        Ok(page_info_value(&info))
    }
}

pub struct WaitTool;

impl WaitTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WaitTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WaitTool {
    fn name(&self) -> &str {
        "wait"
    }

    fn description(&self) -> &str {
        "Pause for a fixed number of milliseconds (capped at 30000). \
         Prefer wait_for_stable when waiting for a page to settle."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "ms": { "type": "integer", "description": "Milliseconds to wait" },
            },
            "required": ["ms"],
        })
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let ms = call
            .args
            .get("ms")
            .and_then(Value::as_u64)
            .ok_or_else(|| RunError::invalid_parameter("ms", "expected integer"))?
            .min(MAX_WAIT_MS);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(json!({ "waitedMs": ms }))
    }
}

pub struct WaitForStableTool {
    driver: Driver,
}

impl WaitForStableTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for WaitForStableTool {
    fn name(&self) -> &str {
        "wait_for_stable"
    }

    fn description(&self) -> &str {
        "Wait until the page's DOM mutation rate settles or the timeout \
         elapses. Returns whether stability was reached."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sessionId": { "type": "string" },
                "timeoutMs": { "type": "integer" },
            },
            "required": ["sessionId"],
        })
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let session = arg_str(&call.args, "sessionId")?;
        let timeout = call
            .args
            .get("timeoutMs")
            .and_then(Value::as_u64)
            .unwrap_or(5000)
            .min(MAX_WAIT_MS);
        let stable = self
            .driver
            .wait_for_stable(session, timeout)
            .await
            .map_err(map_err)?;
        Ok(json!({ "stable": stable }))
    }
}
