// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod client;
pub mod mock;
mod openai;
mod types;

pub use client::ChatModel;
pub use openai::OpenAiCompatModel;
pub use types::{ChatRequest, ChatResponse, Message, Role, ToolInvocation, ToolSchema, Usage};
