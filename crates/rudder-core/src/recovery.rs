// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use rudder_runs::ErrorCode;

/// What the agent loop does about a failed tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    Retry { delay_ms: u64 },
    InjectHint { message: String },
    Abort { reason: String },
}

/// Inputs to one recovery decision.
#[derive(Debug, Clone)]
pub struct RecoveryContext<'a> {
    pub error_code: Option<ErrorCode>,
    pub error_message: &'a str,
    pub tool_name: &'a str,
    pub consecutive_errors: u32,
}

/// Exponential backoff: `min(2000 · 2^(n−1), 16000)` ms.
pub fn backoff_ms(consecutive_errors: u32) -> u64 {
    let exp = consecutive_errors.saturating_sub(1).min(4);
    (2000u64 << exp).min(16_000)
}

/// The recovery decision table.
///
/// Unrecoverable browser states abort; addressable mistakes get a hint the
/// model can act on; everything transient retries with backoff.
pub fn decide(ctx: &RecoveryContext<'_>) -> RecoveryAction {
    match ctx.error_code {
        Some(ErrorCode::PageCrashed) | Some(ErrorCode::SessionNotFound) => {
            return RecoveryAction::Abort {
                reason: format!(
                    "{} on {}: the browser state is unrecoverable",
                    ctx.error_code.map(|c| c.as_str()).unwrap_or("error"),
                    ctx.tool_name
                ),
            };
        }
        Some(ErrorCode::ElementNotFound) => {
            return RecoveryAction::InjectHint {
                message: "The target element no longer exists. Call get_page_info to \
                          refresh the element list, then address elements by the new ids."
                    .to_string(),
            };
        }
        Some(ErrorCode::NavigationTimeout) => {
            if ctx.consecutive_errors < 3 {
                return RecoveryAction::Retry {
                    delay_ms: backoff_ms(ctx.consecutive_errors),
                };
            }
            return RecoveryAction::InjectHint {
                message: "Navigation keeps timing out. Switch strategy: try a \
                          different URL, wait_for_stable with a longer timeout, or \
                          extract what is already loaded."
                    .to_string(),
            };
        }
        Some(ErrorCode::ExecutionError) => {
            return RecoveryAction::InjectHint {
                message: "The injected script failed. Check the script for syntax \
                          errors and confirm the objects it touches exist on this \
                          page (get_console_logs may show the thrown error)."
                    .to_string(),
            };
        }
        Some(ErrorCode::InvalidParameter) => {
            return RecoveryAction::InjectHint {
                message: "The tool rejected its arguments. Compare your call \
                          against the tool's schema and correct the named field."
                    .to_string(),
            };
        }
        _ => {}
    }

    // Transient transport failures from the model or driver side.
    if is_transient(ctx.error_message) {
        return RecoveryAction::Retry {
            delay_ms: backoff_ms(ctx.consecutive_errors),
        };
    }

    RecoveryAction::Retry {
        delay_ms: backoff_ms(ctx.consecutive_errors),
    }
}

/// Matches the transient patterns seen from LLM gateways and proxies:
/// connection refused/timeout, 429 rate limits, and 5xx statuses.
fn is_transient(message: &str) -> bool {
    if message.contains("ECONNREFUSED") || message.contains("ETIMEDOUT") {
        return true;
    }
    let re = regex::Regex::new(r"\b(429|5\d{2})\b").expect("static regex");
    re.is_match(message)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(code: Option<ErrorCode>, msg: &'static str, consecutive: u32) -> RecoveryContext<'static> {
        RecoveryContext {
            error_code: code,
            error_message: msg,
            tool_name: "navigate",
            consecutive_errors: consecutive,
        }
    }

    #[test]
    fn page_crash_aborts() {
        let action = decide(&ctx(Some(ErrorCode::PageCrashed), "crashed", 1));
        assert!(matches!(action, RecoveryAction::Abort { .. }));
    }

    #[test]
    fn session_gone_aborts() {
        let action = decide(&ctx(Some(ErrorCode::SessionNotFound), "gone", 1));
        assert!(matches!(action, RecoveryAction::Abort { .. }));
    }

    #[test]
    fn element_not_found_hints_page_refresh() {
        let action = decide(&ctx(Some(ErrorCode::ElementNotFound), "stale", 1));
        let RecoveryAction::InjectHint { message } = action else {
            panic!("expected hint");
        };
        assert!(message.contains("get_page_info"));
    }

    #[test]
    fn navigation_timeout_retries_then_hints() {
        assert!(matches!(
            decide(&ctx(Some(ErrorCode::NavigationTimeout), "slow", 1)),
            RecoveryAction::Retry { .. }
        ));
        assert!(matches!(
            decide(&ctx(Some(ErrorCode::NavigationTimeout), "slow", 2)),
            RecoveryAction::Retry { .. }
        ));
        assert!(matches!(
            decide(&ctx(Some(ErrorCode::NavigationTimeout), "slow", 3)),
            RecoveryAction::InjectHint { .. }
        ));
    }

    #[test]
    fn execution_error_hints_script_diagnostics() {
        let action = decide(&ctx(Some(ErrorCode::ExecutionError), "ReferenceError", 1));
        assert!(matches!(action, RecoveryAction::InjectHint { .. }));
    }

    #[test]
    fn invalid_parameter_hints_arg_correction() {
        let action = decide(&ctx(Some(ErrorCode::InvalidParameter), "bad field", 1));
        assert!(matches!(action, RecoveryAction::InjectHint { .. }));
    }

    #[test]
    fn transient_messages_retry() {
        for msg in [
            "connect ECONNREFUSED 127.0.0.1:8000",
            "socket ETIMEDOUT",
            "chat error 429: rate limited",
            "chat error 503: overloaded",
        ] {
            let action = decide(&ctx(None, msg, 1));
            assert!(
                matches!(action, RecoveryAction::Retry { .. }),
                "{msg} should retry"
            );
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_ms(1), 2000);
        assert_eq!(backoff_ms(2), 4000);
        assert_eq!(backoff_ms(3), 8000);
        assert_eq!(backoff_ms(4), 16_000);
        assert_eq!(backoff_ms(9), 16_000);
    }

    #[test]
    fn unknown_error_defaults_to_retry_with_backoff() {
        let action = decide(&ctx(None, "weird failure", 2));
        assert_eq!(action, RecoveryAction::Retry { delay_ms: 4000 });
    }
}
