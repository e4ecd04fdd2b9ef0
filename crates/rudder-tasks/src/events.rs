// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::Serialize;
use serde_json::Value;

/// Events published over a task's SSE stream.  Every stream ends with a
/// `done` event, whatever happened before it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum TaskEvent {
    PlanCreated {
        source: String,
        step: Value,
    },
    StepStarted {
        step_id: String,
    },
    ToolCall {
        name: String,
    },
    ToolResult {
        name: String,
        is_error: bool,
    },
    VerificationResult {
        pass: bool,
        missing_fields: Vec<String>,
    },
    RepairAttempted {
        attempt: u32,
    },
    Done {
        success: bool,
        trace_id: String,
    },
}

impl TaskEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TaskEvent::PlanCreated { .. } => "plan_created",
            TaskEvent::StepStarted { .. } => "step_started",
            TaskEvent::ToolCall { .. } => "tool_call",
            TaskEvent::ToolResult { .. } => "tool_result",
            TaskEvent::VerificationResult { .. } => "verification_result",
            TaskEvent::RepairAttempted { .. } => "repair_attempted",
            TaskEvent::Done { .. } => "done",
        }
    }
}
