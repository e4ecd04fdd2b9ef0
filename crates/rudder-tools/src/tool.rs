// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use rudder_runs::RunError;

/// A single tool invocation, as requested by the agent or a template.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier assigned by the caller (forwarded verbatim).
    pub id: String,
    pub name: String,
    /// Parsed JSON argument object.
    pub args: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// The result of executing a tool through the surface.
///
/// `value` is always a JSON object.  Failures carry the protocol error
/// envelope `{error, errorCode?}` and set `is_error`; exceptions never
/// escape the surface.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub value: Value,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(call_id: impl Into<String>, value: Value) -> Self {
        Self {
            call_id: call_id.into(),
            value,
            is_error: false,
        }
    }

    pub fn err(call_id: impl Into<String>, err: RunError) -> Self {
        Self {
            call_id: call_id.into(),
            value: json!({ "error": err.message, "errorCode": err.code }),
            is_error: true,
        }
    }

    /// Error without a taxonomy code (the `errorCode` field is omitted).
    pub fn err_text(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            value: json!({ "error": message.into() }),
            is_error: true,
        }
    }

    /// Wire text for protocol content blocks.
    pub fn text(&self) -> String {
        self.value.to_string()
    }

    /// The error code string, when this is a coded failure.
    pub fn error_code(&self) -> Option<&str> {
        self.value.get("errorCode").and_then(Value::as_str)
    }
}

/// A tool schema — mirrors the model crate's shape but keeps this crate
/// independent from it.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Trait every tool in the catalog implements.
///
/// Arguments are validated against [`Tool::parameters_schema`] at the
/// surface boundary, so `execute` may assume required fields exist with
/// the declared primitive types.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the argument object.
    fn parameters_schema(&self) -> Value;
    /// Character budget for this tool's enriched result before the
    /// content-budget formatter truncates it.
    fn char_budget(&self) -> usize {
        4000
    }
    /// Execute the tool.  Failures are returned, not thrown; the registry
    /// wraps them into the protocol error envelope.
    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError>;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
