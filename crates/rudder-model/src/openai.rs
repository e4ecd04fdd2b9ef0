// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use anyhow::{bail, Context};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use rudder_config::LlmConfig;

use crate::{ChatModel, ChatRequest, ChatResponse, Message, Role, ToolInvocation, Usage};

/// OpenAI-compatible chat completions driver.
///
/// Speaks the `/chat/completions` wire format shared by OpenAI, OpenRouter,
/// Ollama, llama.cpp, LiteLLM, and most self-hosted gateways, which is the
/// only shape the control plane needs: messages in, one turn out.
pub struct OpenAiCompatModel {
    client: reqwest::Client,
    chat_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatModel {
    pub fn new(cfg: &LlmConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(cfg.timeout_ms))
            .build()
            .context("building HTTP client")?;
        let base = cfg.base_url.trim_end_matches('/');
        let api_key = cfg
            .api_key
            .clone()
            .or_else(|| cfg.api_key_env.as_ref().and_then(|e| std::env::var(e).ok()));
        Ok(Self {
            client,
            chat_url: format!("{base}/chat/completions"),
            api_key,
            model: cfg.model.clone(),
        })
    }

    #[cfg(test)]
    fn for_tests(model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            chat_url: "http://localhost/chat/completions".into(),
            api_key: None,
            model: model.into(),
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, req: ChatRequest) -> anyhow::Result<ChatResponse> {
        let tools: Vec<Value> = req
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": build_wire_messages(&req.messages),
            "stream": false,
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }

        debug!(
            model = %self.model,
            tool_count = tools.len(),
            message_count = req.messages.len(),
            "sending completion request"
        );

        let mut http_req = self.client.post(&self.chat_url).json(&body);
        if let Some(key) = &self.api_key {
            http_req = http_req.bearer_auth(key);
        }

        let resp = http_req.send().await.context("chat request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("chat error {status}: {text}");
        }

        let v: Value = resp.json().await.context("decoding chat response")?;
        parse_completion(&v)
    }
}

/// Serialize the conversation into the OpenAI wire format.
///
/// Assistant messages carrying tool calls become one `tool_calls` array so
/// parallel calls satisfy the provider's pairing contract; tool messages
/// reference their `tool_call_id`.
fn build_wire_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| match m.role {
            Role::Assistant if m.has_tool_calls() => {
                let calls: Vec<Value> = m
                    .tool_calls
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": {
                                "name": c.name,
                                "arguments": c.args.to_string(),
                            }
                        })
                    })
                    .collect();
                let mut v = json!({ "role": "assistant", "tool_calls": calls });
                if !m.content.is_empty() {
                    v["content"] = json!(m.content);
                }
                v
            }
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": m.tool_call_id.as_deref().unwrap_or_default(),
                "content": m.content,
            }),
            _ => json!({ "role": role_str(m.role), "content": m.content }),
        })
        .collect()
}

fn role_str(r: Role) -> &'static str {
    match r {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

/// Decode one non-streaming completion body into a [`ChatResponse`].
fn parse_completion(v: &Value) -> anyhow::Result<ChatResponse> {
    let message = &v["choices"][0]["message"];
    if message.is_null() {
        bail!("chat response missing choices[0].message: {v}");
    }

    let text = message["content"].as_str().unwrap_or_default().to_string();
    let mut tool_calls = Vec::new();
    if let Some(calls) = message["tool_calls"].as_array() {
        for c in calls {
            let name = c["function"]["name"].as_str().unwrap_or_default();
            if name.is_empty() {
                // Cannot dispatch a nameless call; keeping it would corrupt
                // the history sent back on the next turn.
                debug!("dropping tool call with empty name from model");
                continue;
            }
            let raw_args = c["function"]["arguments"].as_str().unwrap_or("{}");
            let args: Value = serde_json::from_str(raw_args)
                .unwrap_or_else(|_| Value::Object(Default::default()));
            tool_calls.push(ToolInvocation {
                id: c["id"].as_str().unwrap_or_default().to_string(),
                name: name.to_string(),
                args,
            });
        }
    }

    let usage = Usage {
        input_tokens: v["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        output_tokens: v["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    };

    Ok(ChatResponse {
        text,
        tool_calls,
        usage,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
