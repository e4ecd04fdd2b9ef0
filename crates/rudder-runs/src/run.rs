// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorCode, RunError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Succeeded,
    PartialSuccess,
    Failed,
    Canceled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded
                | RunStatus::PartialSuccess
                | RunStatus::Failed
                | RunStatus::Canceled
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::PartialSuccess => "partial_success",
            RunStatus::Failed => "failed",
            RunStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunProgress {
    pub done_steps: u32,
    pub total_steps: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// `ended_at - started_at`; set when the run is terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<i64>,
}

/// Snapshot of one task run as seen by callers.
///
/// The manager hands out clones; mutating a snapshot has no effect on the
/// stored run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: String,
    /// Template id, or `"agent_goal"` for free-form runs.
    pub template_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Whether the orchestrator created the session and must reap it.
    pub owns_session: bool,
    pub status: RunStatus,
    pub progress: RunProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
    pub artifact_ids: Vec<String>,
    pub metrics: RunMetrics,
}

/// Derive a terminal status from an executor's successful return value.
///
/// A result that carries `summary{total, succeeded, failed}` is graded by
/// its counts; `{success:false}` maps to failed; anything else succeeded.
pub fn derive_status(result: &Value) -> RunStatus {
    if result.get("success").and_then(Value::as_bool) == Some(false) {
        return RunStatus::Failed;
    }
    if let Some(summary) = result.get("summary") {
        let total = summary.get("total").and_then(Value::as_u64);
        let succeeded = summary.get("succeeded").and_then(Value::as_u64);
        if let (Some(total), Some(succeeded)) = (total, succeeded) {
            if succeeded == total {
                return RunStatus::Succeeded;
            }
            if succeeded == 0 && total > 0 {
                return RunStatus::Failed;
            }
            if succeeded < total {
                return RunStatus::PartialSuccess;
            }
        }
    }
    RunStatus::Succeeded
}

/// Extract the error to attach when a derived status is `Failed`.
///
/// Prefers an `errorCode`/`error` pair present in the result; falls back
/// to a generic execution error.
pub(crate) fn error_from_result(result: &Value) -> RunError {
    let code = result
        .get("errorCode")
        .and_then(Value::as_str)
        .and_then(ErrorCode::parse)
        .unwrap_or(ErrorCode::ExecutionError);
    let message = result
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("executor reported failure")
        .to_string();
    RunError::new(code, message)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn terminal_statuses() {
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Succeeded.is_terminal());
        assert!(RunStatus::PartialSuccess.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Canceled.is_terminal());
    }

    #[test]
    fn status_serializes_snake_case() {
        let v = serde_json::to_value(RunStatus::PartialSuccess).unwrap();
        assert_eq!(v, "partial_success");
    }

    #[test]
    fn derive_all_succeeded() {
        let s = derive_status(&json!({"summary": {"total": 3, "succeeded": 3, "failed": 0}}));
        assert_eq!(s, RunStatus::Succeeded);
    }

    #[test]
    fn derive_partial() {
        let s = derive_status(&json!({"summary": {"total": 2, "succeeded": 1, "failed": 1}}));
        assert_eq!(s, RunStatus::PartialSuccess);
    }

    #[test]
    fn derive_all_failed() {
        let s = derive_status(&json!({"summary": {"total": 2, "succeeded": 0, "failed": 2}}));
        assert_eq!(s, RunStatus::Failed);
    }

    #[test]
    fn derive_success_flag_false() {
        assert_eq!(derive_status(&json!({"success": false})), RunStatus::Failed);
    }

    #[test]
    fn derive_plain_result_is_success() {
        assert_eq!(derive_status(&json!({"title": "x"})), RunStatus::Succeeded);
    }

    #[test]
    fn derive_empty_summary_total_is_success() {
        let s = derive_status(&json!({"summary": {"total": 0, "succeeded": 0, "failed": 0}}));
        assert_eq!(s, RunStatus::Succeeded);
    }

    #[test]
    fn error_from_result_prefers_embedded_code() {
        let e = error_from_result(&json!({
            "success": false,
            "error": "indicator never appeared",
            "errorCode": "NAVIGATION_TIMEOUT"
        }));
        assert_eq!(e.code, ErrorCode::NavigationTimeout);
        assert_eq!(e.message, "indicator never appeared");
    }

    #[test]
    fn error_from_result_defaults_to_execution_error() {
        let e = error_from_result(&json!({"success": false}));
        assert_eq!(e.code, ErrorCode::ExecutionError);
    }
}
