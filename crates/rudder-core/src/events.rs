// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde_json::Value;

use crate::progress::AgentPhase;

/// Events emitted by the agent loop during one run.
/// Consumers (task service, SSE stream) subscribe to drive their output.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// Phase/percent estimate recomputed at the top of an iteration.
    Progress { phase: AgentPhase, percent: u8 },
    /// The model requested a tool call.
    ToolCallStarted { name: String, args: Value },
    /// A tool call finished.
    ToolCallFinished {
        name: String,
        is_error: bool,
        error_code: Option<String>,
    },
    /// A tool produced a stored artifact (e.g. a screenshot).
    ArtifactProduced { artifact_id: String },
    /// A detector or recovery hint was injected at the user role.
    HintInjected { kind: String },
    /// The loop finished (successfully or not).
    Done { success: bool },
}
