// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use rudder_runs::{ArtifactKind, ArtifactStore, RunError};

use super::{arg_str, do_page_content, map_err, page_info_value, Driver};
use crate::tool::{Tool, ToolCall};

const DEFAULT_CONTENT_CHARS: usize = 50_000;

pub struct GetPageInfoTool {
    driver: Driver,
}

impl GetPageInfoTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for GetPageInfoTool {
    fn name(&self) -> &str {
        "get_page_info"
    }

    fn description(&self) -> &str {
        "Snapshot the active page: URL, title, headings, and the flat list \
         of interactive elements with semantic ids. Element ids from this \
         snapshot are the addresses click/type_text/etc. use."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "sessionId": { "type": "string" } },
            "required": ["sessionId"],
        })
    }

    fn char_budget(&self) -> usize {
        8000
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let session = arg_str(&call.args, "sessionId")?;
        let info = self.driver.page_info(session).await.map_err(map_err)?;
        Ok(page_info_value(&info))
    }
}

pub struct GetPageContentTool {
    driver: Driver,
}

impl GetPageContentTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for GetPageContentTool {
    fn name(&self) -> &str {
        "get_page_content"
    }

    fn description(&self) -> &str {
        "Extract the readable text of the active page (HTML converted to \
         plain text, up to maxChars characters)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sessionId": { "type": "string" },
                "maxChars": { "type": "integer" },
            },
            "required": ["sessionId"],
        })
    }

    fn char_budget(&self) -> usize {
        12_000
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let session = arg_str(&call.args, "sessionId")?;
        let max_chars = call
            .args
            .get("maxChars")
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_CONTENT_CHARS);
        do_page_content(&self.driver, session, max_chars).await
    }
}

pub struct FindElementTool {
    driver: Driver,
}

impl FindElementTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for FindElementTool {
    fn name(&self) -> &str {
        "find_element"
    }

    fn description(&self) -> &str {
        "Element lookup. mode=semantic (default) matches the query against \
         element roles and accessible names; mode=selector resolves the \
         query as an exact CSS selector. Returns the best match or \
         found=false."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sessionId": { "type": "string" },
                "query": { "type": "string", "description": "Role/name fragment, or a CSS selector in selector mode" },
                "mode": { "type": "string", "description": "semantic (default) | selector" },
            },
            "required": ["sessionId", "query"],
        })
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let session = arg_str(&call.args, "sessionId")?;
        let query = arg_str(&call.args, "query")?;
        let found = match call.args.get("mode").and_then(Value::as_str) {
            None | Some("semantic") => self
                .driver
                .find_element(session, query)
                .await
                .map_err(map_err)?,
            Some("selector") => self
                .driver
                .query_selector(session, query)
                .await
                .map_err(map_err)?,
            Some(other) => {
                return Err(RunError::invalid_parameter(
                    "mode",
                    format!("expected semantic or selector, got {other}"),
                ))
            }
        };
        Ok(match found {
            Some(el) => json!({ "found": true, "element": el }),
            None => json!({ "found": false }),
        })
    }
}

pub struct ScreenshotTool {
    driver: Driver,
    artifacts: Arc<ArtifactStore>,
}

impl ScreenshotTool {
    pub fn new(driver: Driver, artifacts: Arc<ArtifactStore>) -> Self {
        Self { driver, artifacts }
    }
}

#[async_trait]
impl Tool for ScreenshotTool {
    fn name(&self) -> &str {
        "screenshot"
    }

    fn description(&self) -> &str {
        "Capture the active tab as an image. The bytes land in the artifact \
         store; fetch them with get_artifact using the returned artifactId."
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
        let bytes = self.driver.screenshot(session).await.map_err(map_err)?;
        let size = bytes.len();
        let artifact_id = self.artifacts.put(bytes, ArtifactKind::Binary, None);
        Ok(json!({ "artifactId": artifact_id, "bytes": size }))
    }
}

pub struct ExecuteJavascriptTool {
    driver: Driver,
}

impl ExecuteJavascriptTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for ExecuteJavascriptTool {
    fn name(&self) -> &str {
        "execute_javascript"
    }

    fn description(&self) -> &str {
        "Evaluate a script in page context and return its JSON-serializable \
         result. Use for data extraction the structured tools cannot reach."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sessionId": { "type": "string" },
                "script": { "type": "string" },
            },
            "required": ["sessionId", "script"],
        })
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let session = arg_str(&call.args, "sessionId")?;
        let script = arg_str(&call.args, "script")?;
        let result = self
            .driver
            .evaluate(session, script)
            .await
            .map_err(map_err)?;
        Ok(json!({ "result": result }))
    }
}
