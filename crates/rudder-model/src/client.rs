// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::{ChatRequest, ChatResponse};

/// The chat-model seam the agent loop drives.
///
/// The loop consumes whole turns: one `complete` call returns the model's
/// full text plus any tool-call requests for that turn.  Streaming is a
/// transport concern of individual drivers and is not exposed here.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier as reported to users and logs.
    fn model_name(&self) -> &str;

    /// Send a completion request and return the whole turn.
    ///
    /// Transient transport failures (connection refused, timeouts, 429,
    /// 5xx) must surface in the error message text so the recovery policy
    /// can classify them.
    async fn complete(&self, req: ChatRequest) -> anyhow::Result<ChatResponse>;
}
