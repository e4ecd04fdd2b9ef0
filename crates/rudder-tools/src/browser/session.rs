// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use rudder_runs::RunError;

use super::{arg_str, map_err, Driver};
use crate::tool::{Tool, ToolCall};
use crate::urlcheck::UrlValidator;

pub struct CreateSessionTool {
    driver: Driver,
}

impl CreateSessionTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for CreateSessionTool {
    fn name(&self) -> &str {
        "create_session"
    }

    fn description(&self) -> &str {
        "Start a fresh browser session with one blank tab. Returns the \
         sessionId all other browser tools require. Close it with \
         close_session when done."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "additionalProperties": false })
    }

    async fn execute(&self, _call: &ToolCall) -> Result<Value, RunError> {
        let session_id = self.driver.create_session().await.map_err(map_err)?;
        debug!(session = %session_id, "browser session created");
        Ok(json!({ "sessionId": session_id }))
    }
}

pub struct CloseSessionTool {
    driver: Driver,
}

impl CloseSessionTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for CloseSessionTool {
    fn name(&self) -> &str {
        "close_session"
    }

    fn description(&self) -> &str {
        "Close a browser session and release all of its tabs."
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
        self.driver.close_session(session).await.map_err(map_err)?;
        Ok(json!({ "closed": true }))
    }
}

pub struct ListTabsTool {
    driver: Driver,
}

impl ListTabsTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for ListTabsTool {
    fn name(&self) -> &str {
        "list_tabs"
    }

    fn description(&self) -> &str {
        "List all tabs of a session with their URL, title, and which one is active."
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
        let tabs = self.driver.list_tabs(session).await.map_err(map_err)?;
        Ok(json!({ "tabs": tabs }))
    }
}

pub struct CreateTabTool {
    driver: Driver,
    validator: Arc<UrlValidator>,
}

impl CreateTabTool {
    pub fn new(driver: Driver, validator: Arc<UrlValidator>) -> Self {
        Self { driver, validator }
    }
}

#[async_trait]
impl Tool for CreateTabTool {
    fn name(&self) -> &str {
        "create_tab"
    }

    fn description(&self) -> &str {
        "Open a new tab in the session (optionally navigating it to a URL) \
         and make it the active tab."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sessionId": { "type": "string" },
                "url": { "type": "string" },
            },
            "required": ["sessionId"],
        })
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let session = arg_str(&call.args, "sessionId")?;
        let url = call.args.get("url").and_then(Value::as_str);
        if let Some(u) = url {
            self.validator.validate_resolved(u).await?;
        }
        let tab = self.driver.create_tab(session, url).await.map_err(map_err)?;
        Ok(json!({ "tab": tab }))
    }
}

pub struct CloseTabTool {
    driver: Driver,
}

impl CloseTabTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for CloseTabTool {
    fn name(&self) -> &str {
        "close_tab"
    }

    fn description(&self) -> &str {
        "Close one tab of a session by its tab id."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sessionId": { "type": "string" },
                "tabId": { "type": "string" },
            },
            "required": ["sessionId", "tabId"],
        })
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let session = arg_str(&call.args, "sessionId")?;
        let tab = arg_str(&call.args, "tabId")?;
        self.driver.close_tab(session, tab).await.map_err(map_err)?;
        Ok(json!({ "closed": true }))
    }
}

pub struct SwitchTabTool {
    driver: Driver,
}

impl SwitchTabTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for SwitchTabTool {
    fn name(&self) -> &str {
        "switch_tab"
    }

    fn description(&self) -> &str {
        "Make another tab of the session the active one."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sessionId": { "type": "string" },
                "tabId": { "type": "string" },
            },
            "required": ["sessionId", "tabId"],
        })
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let session = arg_str(&call.args, "sessionId")?;
        let tab = arg_str(&call.args, "tabId")?;
        self.driver.switch_tab(session, tab).await.map_err(map_err)?;
        Ok(json!({ "active": tab }))
    }
}
