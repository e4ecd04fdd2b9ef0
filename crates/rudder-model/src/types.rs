// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocation {
    /// Opaque identifier assigned by the model (forwarded verbatim).
    pub id: String,
    pub name: String,
    /// Parsed JSON argument object.
    pub args: serde_json::Value,
}

/// One message in a conversation.
///
/// Assistant messages may carry `tool_calls`; tool messages carry the
/// `tool_call_id` that links the result back to its request.  A tool
/// message without a preceding assistant message holding the matching id
/// is malformed and rejected by provider APIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Assistant message carrying one or more tool-call requests.
    pub fn assistant_tool_calls(text: impl Into<String>, calls: Vec<ToolInvocation>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            tool_calls: calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Approximate token count for context management.
    ///
    /// `chars_per_token` is the configured estimate divisor (default 4).
    /// Tool-call arguments count toward the total because they are sent to
    /// the provider verbatim.
    pub fn approx_tokens(&self, chars_per_token: usize) -> usize {
        let divisor = chars_per_token.max(1);
        let call_chars: usize = self
            .tool_calls
            .iter()
            .map(|c| c.name.len() + c.args.to_string().len())
            .sum();
        ((self.content.len() + call_chars) / divisor).max(1)
    }
}

/// A tool schema provided to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: serde_json::Value,
}

/// Request sent to a chat model.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
}

/// One whole model turn: assistant text and/or tool-call requests.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub text: String,
    pub tool_calls: Vec<ToolInvocation>,
    pub usage: Usage,
}

impl ChatResponse {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        args: serde_json::Value,
    ) -> Self {
        Self {
            tool_calls: vec![ToolInvocation {
                id: id.into(),
                name: name.into(),
                args,
            }],
            ..Self::default()
        }
    }
}

/// Token usage from one turn.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
