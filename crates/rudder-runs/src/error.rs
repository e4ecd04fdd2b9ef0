// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// The wire-visible error taxonomy.
///
/// These are the exact `errorCode` strings clients and the recovery policy
/// key on; everything unclassifiable maps to `InternalError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidParameter,
    TemplateNotFound,
    RunNotFound,
    RunCanceled,
    RunTimeout,
    RunBackpressure,
    SessionNotFound,
    PageCrashed,
    NavigationTimeout,
    ElementNotFound,
    ExecutionError,
    TrustLevelNotAllowed,
    TplLoginFieldNotFound,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidParameter => "INVALID_PARAMETER",
            ErrorCode::TemplateNotFound => "TEMPLATE_NOT_FOUND",
            ErrorCode::RunNotFound => "RUN_NOT_FOUND",
            ErrorCode::RunCanceled => "RUN_CANCELED",
            ErrorCode::RunTimeout => "RUN_TIMEOUT",
            ErrorCode::RunBackpressure => "RUN_BACKPRESSURE",
            ErrorCode::SessionNotFound => "SESSION_NOT_FOUND",
            ErrorCode::PageCrashed => "PAGE_CRASHED",
            ErrorCode::NavigationTimeout => "NAVIGATION_TIMEOUT",
            ErrorCode::ElementNotFound => "ELEMENT_NOT_FOUND",
            ErrorCode::ExecutionError => "EXECUTION_ERROR",
            ErrorCode::TrustLevelNotAllowed => "TRUST_LEVEL_NOT_ALLOWED",
            ErrorCode::TplLoginFieldNotFound => "TPL_LOGIN_FIELD_NOT_FOUND",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Parse a wire string back into a code.  Unknown strings return `None`
    /// so callers can decide between a default and a pass-through.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INVALID_PARAMETER" => Some(ErrorCode::InvalidParameter),
            "TEMPLATE_NOT_FOUND" => Some(ErrorCode::TemplateNotFound),
            "RUN_NOT_FOUND" => Some(ErrorCode::RunNotFound),
            "RUN_CANCELED" => Some(ErrorCode::RunCanceled),
            "RUN_TIMEOUT" => Some(ErrorCode::RunTimeout),
            "RUN_BACKPRESSURE" => Some(ErrorCode::RunBackpressure),
            "SESSION_NOT_FOUND" => Some(ErrorCode::SessionNotFound),
            "PAGE_CRASHED" => Some(ErrorCode::PageCrashed),
            "NAVIGATION_TIMEOUT" => Some(ErrorCode::NavigationTimeout),
            "ELEMENT_NOT_FOUND" => Some(ErrorCode::ElementNotFound),
            "EXECUTION_ERROR" => Some(ErrorCode::ExecutionError),
            "TRUST_LEVEL_NOT_ALLOWED" => Some(ErrorCode::TrustLevelNotAllowed),
            "TPL_LOGIN_FIELD_NOT_FOUND" => Some(ErrorCode::TplLoginFieldNotFound),
            "INTERNAL_ERROR" => Some(ErrorCode::InternalError),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A coded failure as it appears on runs and in tool envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} ({code})")]
pub struct RunError {
    #[serde(rename = "errorCode")]
    pub code: ErrorCode,
    pub message: String,
}

impl RunError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Validation failure naming the offending field.
    pub fn invalid_parameter(field: &str, detail: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorCode::InvalidParameter,
            format!("invalid parameter '{field}': {detail}"),
        )
    }

    pub fn canceled() -> Self {
        Self::new(ErrorCode::RunCanceled, "run canceled")
    }

    pub fn timeout() -> Self {
        Self::new(ErrorCode::RunTimeout, "run timed out")
    }

    pub fn backpressure(limit: usize) -> Self {
        Self::new(
            ErrorCode::RunBackpressure,
            format!("queued + running runs at the limit of {limit}"),
        )
    }

    /// Wrap an unclassified failure, truncating long messages so internal
    /// details do not flood the wire.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        let mut message = err.to_string();
        if message.len() > 500 {
            message.truncate(500);
            message.push_str("...");
        }
        Self::new(ErrorCode::InternalError, message)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_strings_round_trip() {
        for code in [
            ErrorCode::InvalidParameter,
            ErrorCode::RunCanceled,
            ErrorCode::TplLoginFieldNotFound,
            ErrorCode::InternalError,
        ] {
            assert_eq!(ErrorCode::parse(code.as_str()), Some(code));
        }
    }

    #[test]
    fn serde_uses_screaming_snake() {
        let v = serde_json::to_value(ErrorCode::TrustLevelNotAllowed).unwrap();
        assert_eq!(v, "TRUST_LEVEL_NOT_ALLOWED");
    }

    #[test]
    fn unknown_string_parses_to_none() {
        assert_eq!(ErrorCode::parse("NOT_A_CODE"), None);
    }

    #[test]
    fn run_error_serializes_error_code_key() {
        let e = RunError::invalid_parameter("urls", "expected 1..50 entries");
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["errorCode"], "INVALID_PARAMETER");
        assert!(v["message"].as_str().unwrap().contains("urls"));
    }

    #[test]
    fn internal_truncates_long_messages() {
        let e = RunError::internal("x".repeat(2000));
        assert!(e.message.len() <= 503);
        assert!(e.message.ends_with("..."));
    }
}
