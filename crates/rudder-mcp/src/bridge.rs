// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Type conversions between rudder's tool types and rmcp's MCP model
//! types.  Pure, stateless functions at the seam between the tool surface
//! and the wire protocol.

use std::sync::Arc;

use rmcp::model::{CallToolResult, Content, JsonObject, Tool as McpTool};

use rudder_tools::{ToolOutput, ToolSchema};

/// Convert a [`ToolSchema`] into an rmcp [`McpTool`] descriptor.  The
/// stored parameters are already valid JSON Schema, so they pass through
/// as the `input_schema`.
pub fn schema_to_mcp_tool(schema: ToolSchema) -> McpTool {
    let input_schema: JsonObject = value_to_object(schema.parameters);
    McpTool::new(
        std::borrow::Cow::Owned(schema.name),
        std::borrow::Cow::Owned(schema.description),
        Arc::new(input_schema),
    )
}

/// MCP requires the schema to be a JSON object; wrap anything else in a
/// minimal `{"type":"object"}` envelope.
fn value_to_object(v: serde_json::Value) -> JsonObject {
    use serde_json::{Map, Value};
    match v {
        Value::Object(m) => m,
        other => {
            let mut m = Map::new();
            m.insert("type".to_string(), Value::String("object".to_string()));
            m.insert("value".to_string(), other);
            m
        }
    }
}

/// Convert a [`ToolOutput`] into an rmcp [`CallToolResult`].
///
/// The result value is delivered as one JSON-text content block; the MCP
/// `is_error` flag mirrors the output's error envelope, so clients see
/// `{isError, content:[{type:text, text:{error,errorCode}}]}` on failure.
pub fn output_to_call_result(output: ToolOutput) -> CallToolResult {
    let content = vec![Content::text(output.text())];
    if output.is_error {
        CallToolResult {
            content,
            is_error: Some(true),
            structured_content: None,
            meta: None,
        }
    } else {
        CallToolResult::success(content)
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use rudder_runs::{ErrorCode, RunError};

    fn make_schema(name: &str, desc: &str, params: Value) -> ToolSchema {
        ToolSchema {
            name: name.to_string(),
            description: desc.to_string(),
            parameters: params,
        }
    }

    #[test]
    fn schema_to_mcp_tool_preserves_name_and_description() {
        let schema = make_schema("navigate", "Opens a URL", json!({"type":"object"}));
        let tool = schema_to_mcp_tool(schema);
        assert_eq!(tool.name.as_ref(), "navigate");
        assert_eq!(tool.description.as_deref(), Some("Opens a URL"));
    }

    #[test]
    fn schema_to_mcp_tool_object_schema_passes_through() {
        let schema = make_schema(
            "click",
            "Clicks",
            json!({"type": "object", "properties": {"elementId": {"type": "integer"}}}),
        );
        let tool = schema_to_mcp_tool(schema);
        assert!(tool.input_schema.contains_key("type"));
        assert!(tool.input_schema.contains_key("properties"));
    }

    #[test]
    fn schema_to_mcp_tool_non_object_schema_gets_wrapped() {
        let schema = make_schema("echo", "Echoes", json!("not an object"));
        let tool = schema_to_mcp_tool(schema);
        assert_eq!(
            tool.input_schema.get("type"),
            Some(&Value::String("object".to_string()))
        );
    }

    #[test]
    fn success_output_becomes_json_text_block() {
        let out = ToolOutput::ok("id1", json!({"sessionId": "s1"}));
        let result = output_to_call_result(out);
        assert_eq!(result.is_error, Some(false));
        assert_eq!(result.content.len(), 1);
    }

    #[test]
    fn error_output_sets_is_error_and_keeps_envelope() {
        let out = ToolOutput::err(
            "id2",
            RunError::new(ErrorCode::SessionNotFound, "session gone"),
        );
        let result = output_to_call_result(out);
        assert_eq!(result.is_error, Some(true));
        let wire = serde_json::to_value(&result.content[0]).unwrap();
        let v: Value = serde_json::from_str(wire["text"].as_str().unwrap()).unwrap();
        assert_eq!(v["errorCode"], "SESSION_NOT_FOUND");
        assert_eq!(v["error"], "session gone");
    }
}
