// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use rudder_runs::{ErrorCode, RunError};

use crate::tool::{Tool, ToolCall, ToolOutput, ToolSchema};
use crate::validate::validate_args;

/// Central registry holding the uniform tool catalog.
///
/// Every invocation goes through [`ToolRegistry::execute`], which is the
/// safety envelope: argument validation and tool failures are converted to
/// `{error, errorCode?}` outputs; nothing propagates to the caller.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Schemas for all registered tools, sorted by name.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Character budget for a tool's enriched result; unknown tools get
    /// the default.
    pub fn char_budget(&self, name: &str) -> usize {
        self.tools.get(name).map(|t| t.char_budget()).unwrap_or(4000)
    }

    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(tool) = self.tools.get(&call.name) else {
            return ToolOutput::err(
                &call.id,
                RunError::new(
                    ErrorCode::InvalidParameter,
                    format!("unknown tool: {}", call.name),
                ),
            );
        };
        if let Err(err) = validate_args(&tool.parameters_schema(), &call.args) {
            return ToolOutput::err(&call.id, err);
        }
        match tool.execute(call).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;

    struct EchoTool {
        name: &'static str,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"],
            })
        }
        async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
            Ok(json!({ "echo": call.args["text"] }))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "failing"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn execute(&self, _call: &ToolCall) -> Result<Value, RunError> {
            Err(RunError::new(ErrorCode::PageCrashed, "renderer gone"))
        }
    }

    #[test]
    fn register_and_get() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        assert!(reg.get("echo").is_some());
        assert!(reg.get("nope").is_none());
    }

    #[test]
    fn schemas_sorted_by_name() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "b_tool" });
        reg.register(EchoTool { name: "a_tool" });
        let schemas = reg.schemas();
        let names: Vec<&str> = schemas.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a_tool", "b_tool"]);
    }

    #[tokio::test]
    async fn execute_known_tool_succeeds() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        let out = reg
            .execute(&ToolCall::new("1", "echo", json!({"text": "hi"})))
            .await;
        assert!(!out.is_error);
        assert_eq!(out.value["echo"], "hi");
    }

    #[tokio::test]
    async fn execute_unknown_tool_is_enveloped_error() {
        let reg = ToolRegistry::new();
        let out = reg.execute(&ToolCall::new("x", "missing", json!({}))).await;
        assert!(out.is_error);
        assert_eq!(out.error_code(), Some("INVALID_PARAMETER"));
        assert!(out.value["error"]
            .as_str()
            .unwrap()
            .contains("unknown tool"));
    }

    #[tokio::test]
    async fn invalid_args_rejected_before_execution() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        let out = reg.execute(&ToolCall::new("1", "echo", json!({}))).await;
        assert!(out.is_error);
        assert_eq!(out.error_code(), Some("INVALID_PARAMETER"));
    }

    #[tokio::test]
    async fn tool_failure_becomes_envelope_not_panic() {
        let mut reg = ToolRegistry::new();
        reg.register(FailingTool);
        let out = reg.execute(&ToolCall::new("1", "failing", json!({}))).await;
        assert!(out.is_error);
        assert_eq!(out.error_code(), Some("PAGE_CRASHED"));
    }

    #[test]
    fn char_budget_defaults_for_unknown() {
        let reg = ToolRegistry::new();
        assert_eq!(reg.char_budget("anything"), 4000);
    }
}
