// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::Serialize;

use crate::tracker::ToolCallRecord;

/// Coarse phase of an agent run, derived from recent tool usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentPhase {
    Navigating,
    Observing,
    Acting,
    Extracting,
    Completing,
}

impl AgentPhase {
    fn base_percent(&self) -> u8 {
        match self {
            AgentPhase::Navigating => 15,
            AgentPhase::Observing => 35,
            AgentPhase::Acting => 55,
            AgentPhase::Extracting => 75,
            AgentPhase::Completing => 90,
        }
    }
}

/// Classify the current phase from the most recent tool call.
pub fn phase_for(records: &[ToolCallRecord]) -> AgentPhase {
    let Some(last) = records.last() else {
        return AgentPhase::Navigating;
    };
    match last.name.as_str() {
        "navigate" | "go_back" | "create_tab" | "switch_tab" | "navigate_and_extract" => {
            AgentPhase::Navigating
        }
        "get_page_info" | "find_element" | "screenshot" | "get_dialog_info"
        | "get_console_logs" | "get_network_logs" | "list_tabs" => AgentPhase::Observing,
        "get_page_content" | "execute_javascript" | "get_artifact" => AgentPhase::Extracting,
        "get_task_run" | "list_task_runs" => AgentPhase::Completing,
        _ => AgentPhase::Acting,
    }
}

/// Percent = phase weight plus iteration progress, capped at 99 — only a
/// terminal `done` reports 100.
pub fn progress_percent(phase: AgentPhase, iteration: u32, max_iterations: u32) -> u8 {
    let base = phase.base_percent() as u32;
    let span = max_iterations.max(1);
    let drift = (iteration.min(span) * 9) / span;
    ((base + drift).min(99)) as u8
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn rec(name: &str) -> ToolCallRecord {
        ToolCallRecord {
            name: name.into(),
            args: json!({}),
            success: true,
            error_code: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn empty_history_is_navigating() {
        assert_eq!(phase_for(&[]), AgentPhase::Navigating);
    }

    #[test]
    fn last_call_decides_phase() {
        assert_eq!(phase_for(&[rec("navigate")]), AgentPhase::Navigating);
        assert_eq!(phase_for(&[rec("get_page_info")]), AgentPhase::Observing);
        assert_eq!(phase_for(&[rec("click")]), AgentPhase::Acting);
        assert_eq!(phase_for(&[rec("get_page_content")]), AgentPhase::Extracting);
        assert_eq!(phase_for(&[rec("get_task_run")]), AgentPhase::Completing);
    }

    #[test]
    fn percent_never_reaches_100() {
        for phase in [
            AgentPhase::Navigating,
            AgentPhase::Observing,
            AgentPhase::Acting,
            AgentPhase::Extracting,
            AgentPhase::Completing,
        ] {
            for iteration in 0..30 {
                assert!(progress_percent(phase, iteration, 20) <= 99);
            }
        }
    }

    #[test]
    fn percent_grows_with_iterations() {
        let early = progress_percent(AgentPhase::Acting, 1, 20);
        let late = progress_percent(AgentPhase::Acting, 19, 20);
        assert!(late > early);
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(AgentPhase::Extracting).unwrap(),
            "extracting"
        );
    }
}
