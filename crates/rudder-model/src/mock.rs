// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::{ChatModel, ChatRequest, ChatResponse};

/// Deterministic mock model for tests.  Echoes the last user message back
/// as the assistant response.
#[derive(Default)]
pub struct MockModel;

#[async_trait]
impl ChatModel for MockModel {
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, req: ChatRequest) -> anyhow::Result<ChatResponse> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == crate::Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("[no input]");
        Ok(ChatResponse::text_only(format!("MOCK: {reply}")))
    }
}

/// A pre-scripted model.  Each `complete` call pops the next response from
/// the front of the script, so tests can specify exact turn sequences —
/// including tool calls — without network access.
pub struct ScriptedModel {
    turns: Arc<Mutex<Vec<ChatResponse>>>,
    /// The last [`ChatRequest`] seen by this model.  Written on each
    /// `complete()` call so tests can inspect what was sent.
    pub last_request: Arc<Mutex<Option<ChatRequest>>>,
}

impl ScriptedModel {
    /// Build a model from an ordered list of turns.
    pub fn new(turns: Vec<ChatResponse>) -> Self {
        Self {
            turns: Arc::new(Mutex::new(turns)),
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Convenience: a model that always answers with one text turn.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![ChatResponse::text_only(reply)])
    }

    /// Remaining unscripted turns (0 when the script ran to completion).
    pub fn remaining(&self) -> usize {
        self.turns.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted-mock"
    }

    async fn complete(&self, req: ChatRequest) -> anyhow::Result<ChatResponse> {
        *self.last_request.lock().unwrap() = Some(req);
        let mut turns = self.turns.lock().unwrap();
        if turns.is_empty() {
            anyhow::bail!("scripted model exhausted: no turn for this call");
        }
        Ok(turns.remove(0))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Message;
    use serde_json::json;

    #[tokio::test]
    async fn mock_echoes_last_user_message() {
        let m = MockModel;
        let resp = m
            .complete(ChatRequest {
                messages: vec![Message::user("ping")],
                tools: vec![],
            })
            .await
            .unwrap();
        assert_eq!(resp.text, "MOCK: ping");
    }

    #[tokio::test]
    async fn scripted_pops_in_order() {
        let m = ScriptedModel::new(vec![
            ChatResponse::tool_call("1", "navigate", json!({"url": "https://a"})),
            ChatResponse::text_only("finished"),
        ]);
        let req = ChatRequest::default();
        let first = m.complete(req.clone()).await.unwrap();
        assert_eq!(first.tool_calls[0].name, "navigate");
        let second = m.complete(req).await.unwrap();
        assert_eq!(second.text, "finished");
        assert_eq!(m.remaining(), 0);
    }

    #[tokio::test]
    async fn scripted_errors_when_exhausted() {
        let m = ScriptedModel::new(vec![]);
        assert!(m.complete(ChatRequest::default()).await.is_err());
    }

    #[tokio::test]
    async fn scripted_records_last_request() {
        let m = ScriptedModel::always_text("ok");
        m.complete(ChatRequest {
            messages: vec![Message::user("question")],
            tools: vec![],
        })
        .await
        .unwrap();
        let seen = m.last_request.lock().unwrap();
        assert_eq!(seen.as_ref().unwrap().messages[0].content, "question");
    }
}
