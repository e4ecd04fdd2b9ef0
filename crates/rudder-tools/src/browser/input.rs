// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use rudder_runs::RunError;

use super::{arg_str, arg_u32, map_err, Driver};
use crate::tool::{Tool, ToolCall};

macro_rules! element_arg_schema {
    ($($extra_key:literal : $extra:tt),*) => {
        json!({
            "type": "object",
            "properties": {
                "sessionId": { "type": "string" },
                "elementId": { "type": "integer", "description": "Semantic element id from get_page_info" },
                $($extra_key: $extra),*
            },
            "required": ["sessionId", "elementId"],
        })
    };
}

pub struct ClickTool {
    driver: Driver,
}

impl ClickTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for ClickTool {
    fn name(&self) -> &str {
        "click"
    }

    fn description(&self) -> &str {
        "Click an element by its semantic id. Ids come from get_page_info \
         or find_element and stay valid until the page state changes."
    }

    fn parameters_schema(&self) -> Value {
        element_arg_schema!()
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let session = arg_str(&call.args, "sessionId")?;
        let element = arg_u32(&call.args, "elementId")?;
        self.driver.click(session, element).await.map_err(map_err)?;
        Ok(json!({ "clicked": element }))
    }
}

pub struct TypeTextTool {
    driver: Driver,
}

impl TypeTextTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for TypeTextTool {
    fn name(&self) -> &str {
        "type_text"
    }

    fn description(&self) -> &str {
        "Type text into an element keystroke by keystroke (fires input events)."
    }

    fn parameters_schema(&self) -> Value {
        element_arg_schema!("text": { "type": "string" })
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let session = arg_str(&call.args, "sessionId")?;
        let element = arg_u32(&call.args, "elementId")?;
        let text = arg_str(&call.args, "text")?;
        self.driver
            .type_text(session, element, text)
            .await
            .map_err(map_err)?;
        Ok(json!({ "typed": text.len() }))
    }
}

pub struct PressKeyTool {
    driver: Driver,
}

impl PressKeyTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for PressKeyTool {
    fn name(&self) -> &str {
        "press_key"
    }

    fn description(&self) -> &str {
        "Press a keyboard key in the active tab, e.g. Enter, Tab, Escape, ArrowDown."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sessionId": { "type": "string" },
                "key": { "type": "string" },
            },
            "required": ["sessionId", "key"],
        })
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let session = arg_str(&call.args, "sessionId")?;
        let key = arg_str(&call.args, "key")?;
        self.driver.press_key(session, key).await.map_err(map_err)?;
        Ok(json!({ "pressed": key }))
    }
}

pub struct ScrollTool {
    driver: Driver,
}

impl ScrollTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for ScrollTool {
    fn name(&self) -> &str {
        "scroll"
    }

    fn description(&self) -> &str {
        "Scroll the active tab by a pixel delta. Positive dy scrolls down."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sessionId": { "type": "string" },
                "dx": { "type": "integer" },
                "dy": { "type": "integer" },
            },
            "required": ["sessionId"],
        })
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let session = arg_str(&call.args, "sessionId")?;
        let dx = call.args.get("dx").and_then(Value::as_i64).unwrap_or(0);
        let dy = call.args.get("dy").and_then(Value::as_i64).unwrap_or(0);
        self.driver.scroll(session, dx, dy).await.map_err(map_err)?;
        Ok(json!({ "dx": dx, "dy": dy }))
    }
}

pub struct SelectOptionTool {
    driver: Driver,
}

impl SelectOptionTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for SelectOptionTool {
    fn name(&self) -> &str {
        "select_option"
    }

    fn description(&self) -> &str {
        "Select an option of a <select> element by value."
    }

    fn parameters_schema(&self) -> Value {
        element_arg_schema!("value": { "type": "string" })
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let session = arg_str(&call.args, "sessionId")?;
        let element = arg_u32(&call.args, "elementId")?;
        let value = arg_str(&call.args, "value")?;
        self.driver
            .select_option(session, element, value)
            .await
            .map_err(map_err)?;
        Ok(json!({ "selected": value }))
    }
}

pub struct HoverTool {
    driver: Driver,
}

impl HoverTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for HoverTool {
    fn name(&self) -> &str {
        "hover"
    }

    fn description(&self) -> &str {
        "Move the pointer over an element (triggers hover menus and tooltips)."
    }

    fn parameters_schema(&self) -> Value {
        element_arg_schema!()
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let session = arg_str(&call.args, "sessionId")?;
        let element = arg_u32(&call.args, "elementId")?;
        self.driver.hover(session, element).await.map_err(map_err)?;
        Ok(json!({ "hovered": element }))
    }
}

pub struct SetValueTool {
    driver: Driver,
}

impl SetValueTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for SetValueTool {
    fn name(&self) -> &str {
        "set_value"
    }

    fn description(&self) -> &str {
        "Set an input's value directly (no per-keystroke events). Faster \
         than type_text for long values; some reactive forms require \
         type_text instead."
    }

    fn parameters_schema(&self) -> Value {
        element_arg_schema!("value": { "type": "string" })
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let session = arg_str(&call.args, "sessionId")?;
        let element = arg_u32(&call.args, "elementId")?;
        let value = arg_str(&call.args, "value")?;
        self.driver
            .set_value(session, element, value)
            .await
            .map_err(map_err)?;
        Ok(json!({ "set": true }))
    }
}

pub struct UploadFileTool {
    driver: Driver,
}

impl UploadFileTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for UploadFileTool {
    fn name(&self) -> &str {
        "upload_file"
    }

    fn description(&self) -> &str {
        "Attach a local file to a file-input element."
    }

    fn parameters_schema(&self) -> Value {
        element_arg_schema!("path": { "type": "string" })
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let session = arg_str(&call.args, "sessionId")?;
        let element = arg_u32(&call.args, "elementId")?;
        let path = arg_str(&call.args, "path")?;
        self.driver
            .upload_file(session, element, path)
            .await
            .map_err(map_err)?;
        Ok(json!({ "uploaded": path }))
    }
}
