// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde_json::Value;

/// One recorded tool call.  Append-only per agent session.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub name: String,
    pub args: Value,
    pub success: bool,
    pub error_code: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Patterns the tracker can detect, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedPattern {
    FutileRetry,
    ExactRepeat,
    Oscillation,
    ProgressStall,
}

impl DetectedPattern {
    pub fn kind(&self) -> &'static str {
        match self {
            DetectedPattern::FutileRetry => "futile_retry",
            DetectedPattern::ExactRepeat => "exact_repeat",
            DetectedPattern::Oscillation => "oscillation",
            DetectedPattern::ProgressStall => "progress_stall",
        }
    }

    /// The hint injected verbatim into the conversation when this pattern
    /// fires.
    pub fn hint(&self) -> &'static str {
        match self {
            DetectedPattern::FutileRetry => {
                "The last two identical tool calls both failed. Repeating the same \
                 call will fail again — change the arguments, refresh the page state \
                 with get_page_info, or take a different approach."
            }
            DetectedPattern::ExactRepeat => {
                "You have made the same tool call three times in a row. The result \
                 will not change; use what you already received or choose a \
                 different action."
            }
            DetectedPattern::Oscillation => {
                "You are alternating between the same two calls without progress. \
                 Step back, re-read the latest results, and pick a new strategy."
            }
            DetectedPattern::ProgressStall => {
                "The last five calls only observed the page without acting. If you \
                 have enough information, act on it (click, type, navigate) or \
                 finish with done."
            }
        }
    }
}

/// Tools that only observe page state.
const OBSERVATION_TOOLS: &[&str] = &[
    "get_page_info",
    "get_page_content",
    "find_element",
    "screenshot",
];

/// Records tool calls and runs the loop-detection rules.
#[derive(Default)]
pub struct ToolUsageTracker {
    records: Vec<ToolCallRecord>,
}

impl ToolUsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        name: &str,
        args: &Value,
        success: bool,
        error_code: Option<String>,
    ) {
        self.records.push(ToolCallRecord {
            name: name.to_string(),
            args: args.clone(),
            success,
            error_code,
            timestamp: Utc::now(),
        });
    }

    pub fn records(&self) -> &[ToolCallRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Consecutive trailing failures (resets on any success).
    pub fn consecutive_errors(&self) -> u32 {
        self.records
            .iter()
            .rev()
            .take_while(|r| !r.success)
            .count() as u32
    }

    /// Run all detectors in order; first match wins.
    pub fn detect_any(&self) -> Option<DetectedPattern> {
        if self.futile_retry() {
            return Some(DetectedPattern::FutileRetry);
        }
        if self.exact_repeat() {
            return Some(DetectedPattern::ExactRepeat);
        }
        if self.oscillation() {
            return Some(DetectedPattern::Oscillation);
        }
        if self.progress_stall() {
            return Some(DetectedPattern::ProgressStall);
        }
        None
    }

    /// Last 2 calls identical `(name, args)` and both failed.
    fn futile_retry(&self) -> bool {
        let n = self.records.len();
        if n < 2 {
            return false;
        }
        let (a, b) = (&self.records[n - 2], &self.records[n - 1]);
        same_call(a, b) && !a.success && !b.success
    }

    /// Last 3 calls identical `(name, args)`.
    fn exact_repeat(&self) -> bool {
        let n = self.records.len();
        if n < 3 {
            return false;
        }
        let last = &self.records[n - 1];
        self.records[n - 3..].iter().all(|r| same_call(r, last))
    }

    /// Last 6 calls show a period-2 A-B-A-B-A-B pattern with A ≠ B.
    fn oscillation(&self) -> bool {
        let n = self.records.len();
        if n < 6 {
            return false;
        }
        let window = &self.records[n - 6..];
        let a = &window[0];
        let b = &window[1];
        if same_call(a, b) {
            return false;
        }
        window
            .iter()
            .enumerate()
            .all(|(i, r)| same_call(r, if i % 2 == 0 { a } else { b }))
    }

    /// Last 5 calls all in the observation subset.
    fn progress_stall(&self) -> bool {
        let n = self.records.len();
        if n < 5 {
            return false;
        }
        self.records[n - 5..]
            .iter()
            .all(|r| OBSERVATION_TOOLS.contains(&r.name.as_str()))
    }
}

fn same_call(a: &ToolCallRecord, b: &ToolCallRecord) -> bool {
    a.name == b.name && a.args == b.args
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tracker_with(calls: &[(&str, Value, bool)]) -> ToolUsageTracker {
        let mut t = ToolUsageTracker::new();
        for (name, args, success) in calls {
            t.record(name, args, *success, (!success).then(|| "EXECUTION_ERROR".into()));
        }
        t
    }

    // ── Futile retry ──────────────────────────────────────────────────────

    #[test]
    fn three_identical_failing_clicks_detect_futile_retry() {
        let args = json!({"sessionId": "s", "elementId": 3});
        let t = tracker_with(&[
            ("click", args.clone(), false),
            ("click", args.clone(), false),
            ("click", args, false),
        ]);
        // Futile retry is checked before exact repeat, so it wins.
        assert_eq!(t.detect_any(), Some(DetectedPattern::FutileRetry));
        assert_eq!(t.detect_any().unwrap().kind(), "futile_retry");
    }

    #[test]
    fn two_identical_failures_suffice() {
        let args = json!({"x": 1});
        let t = tracker_with(&[("navigate", args.clone(), false), ("navigate", args, false)]);
        assert_eq!(t.detect_any(), Some(DetectedPattern::FutileRetry));
    }

    #[test]
    fn identical_failures_with_different_args_do_not_fire() {
        let t = tracker_with(&[
            ("click", json!({"elementId": 1}), false),
            ("click", json!({"elementId": 2}), false),
        ]);
        assert_eq!(t.detect_any(), None);
    }

    // ── Exact repeat ──────────────────────────────────────────────────────

    #[test]
    fn three_identical_successes_detect_exact_repeat() {
        let args = json!({"sessionId": "s"});
        let t = tracker_with(&[
            ("get_page_info", args.clone(), true),
            ("get_page_info", args.clone(), true),
            ("get_page_info", args, true),
        ]);
        assert_eq!(t.detect_any(), Some(DetectedPattern::ExactRepeat));
    }

    #[test]
    fn two_identical_successes_do_not_fire() {
        let args = json!({});
        let t = tracker_with(&[("wait", args.clone(), true), ("wait", args, true)]);
        assert_eq!(t.detect_any(), None);
    }

    // ── Oscillation ───────────────────────────────────────────────────────

    #[test]
    fn abab_pattern_detects_oscillation() {
        let a = ("scroll", json!({"dy": 100}), true);
        let b = ("scroll", json!({"dy": -100}), true);
        let t = tracker_with(&[
            a.clone(),
            b.clone(),
            a.clone(),
            b.clone(),
            a.clone(),
            b,
        ]);
        assert_eq!(t.detect_any(), Some(DetectedPattern::Oscillation));
    }

    #[test]
    fn aabb_pattern_is_not_oscillation() {
        let a = ("click", json!({"elementId": 1}), true);
        let b = ("click", json!({"elementId": 2}), true);
        let t = tracker_with(&[a.clone(), a.clone(), b.clone(), b.clone(), a, b]);
        assert_eq!(t.detect_any(), None);
    }

    // ── Progress stall ────────────────────────────────────────────────────

    #[test]
    fn five_observations_detect_stall() {
        let t = tracker_with(&[
            ("get_page_info", json!({"p": 1}), true),
            ("get_page_content", json!({"p": 2}), true),
            ("find_element", json!({"p": 3}), true),
            ("screenshot", json!({"p": 4}), true),
            ("get_page_info", json!({"p": 5}), true),
        ]);
        assert_eq!(t.detect_any(), Some(DetectedPattern::ProgressStall));
    }

    #[test]
    fn action_within_window_prevents_stall() {
        let t = tracker_with(&[
            ("get_page_info", json!({"p": 1}), true),
            ("get_page_content", json!({"p": 2}), true),
            ("click", json!({"elementId": 1}), true),
            ("find_element", json!({"p": 3}), true),
            ("screenshot", json!({"p": 4}), true),
        ]);
        assert_eq!(t.detect_any(), None);
    }

    // ── Bookkeeping ───────────────────────────────────────────────────────

    #[test]
    fn consecutive_errors_counts_trailing_failures() {
        let t = tracker_with(&[
            ("navigate", json!({"u": 1}), true),
            ("click", json!({"e": 1}), false),
            ("click", json!({"e": 2}), false),
        ]);
        assert_eq!(t.consecutive_errors(), 2);
    }

    #[test]
    fn every_pattern_has_a_nonempty_hint() {
        for p in [
            DetectedPattern::FutileRetry,
            DetectedPattern::ExactRepeat,
            DetectedPattern::Oscillation,
            DetectedPattern::ProgressStall,
        ] {
            assert!(!p.hint().is_empty());
        }
    }
}
