// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde_json::Value;

/// Envelope fields that survive budget reduction.  Raw payload keys are
/// dropped first because the enrichment already restates what matters in
/// `aiSummary` / `aiMarkdown`.
const AI_KEYS: &[&str] = &[
    "aiSchemaVersion",
    "aiDetailLevel",
    "aiSummary",
    "aiMarkdown",
    "aiHints",
    "nextActions",
    "deltaSummary",
    "aiDetailPolicy",
    "schemaRepairGuidance",
    "error",
    "errorCode",
];

/// Fit an enriched tool result into a per-tool character budget.
///
/// Reduction is staged: the full envelope is used when it fits; otherwise
/// the raw payload keys are dropped in favour of the ai fields; otherwise
/// `aiMarkdown` is truncated line-wise; as a last resort only the summary
/// survives.  Every truncation leaves an explicit notice so the model
/// knows content was elided.
pub fn format_within_budget(envelope: &Value, budget_chars: usize) -> String {
    let full = envelope.to_string();
    if budget_chars == 0 || full.len() <= budget_chars {
        return full;
    }

    let Some(obj) = envelope.as_object() else {
        return truncate_str(&full, budget_chars);
    };

    // Stage 1: ai fields only.
    let mut reduced = serde_json::Map::new();
    for key in AI_KEYS {
        if let Some(v) = obj.get(*key) {
            reduced.insert((*key).to_string(), v.clone());
        }
    }
    reduced.insert("aiTruncated".to_string(), Value::Bool(true));
    let stage1 = Value::Object(reduced.clone()).to_string();
    if stage1.len() <= budget_chars {
        return stage1;
    }

    // Stage 2: shrink the markdown to whatever room remains.
    if let Some(Value::String(md)) = reduced.get("aiMarkdown").cloned() {
        reduced.remove("aiMarkdown");
        let overhead = Value::Object(reduced.clone()).to_string().len();
        if budget_chars > overhead + 64 {
            let room = budget_chars - overhead - 64;
            reduced.insert(
                "aiMarkdown".to_string(),
                Value::String(truncate_lines(&md, room)),
            );
        }
        let stage2 = Value::Object(reduced.clone()).to_string();
        if stage2.len() <= budget_chars {
            return stage2;
        }
    }

    // Last resort: summary only.
    let summary = obj
        .get("aiSummary")
        .and_then(Value::as_str)
        .unwrap_or("result truncated");
    let fallback = serde_json::json!({
        "aiSummary": truncate_str(summary, budget_chars.saturating_sub(40)),
        "aiTruncated": true,
    });
    fallback.to_string()
}

/// Keep leading lines within `cap_chars`, ending with an omission notice.
fn truncate_lines(text: &str, cap_chars: usize) -> String {
    if text.len() <= cap_chars {
        return text.to_string();
    }
    let mut kept = String::with_capacity(cap_chars);
    let mut kept_count = 0usize;
    let lines: Vec<&str> = text.lines().collect();
    for line in &lines {
        let needed = if kept.is_empty() {
            line.len()
        } else {
            line.len() + 1
        };
        if kept.len() + needed > cap_chars {
            break;
        }
        if !kept.is_empty() {
            kept.push('\n');
        }
        kept.push_str(line);
        kept_count += 1;
    }
    let omitted = lines.len().saturating_sub(kept_count);
    format!("{kept}\n[... {omitted} lines omitted to fit the content budget ...]")
}

fn truncate_str(s: &str, cap: usize) -> String {
    if s.len() <= cap {
        return s.to_string();
    }
    let mut cut = cap;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &s[..cut])
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(markdown_lines: usize) -> Value {
        let md: String = (0..markdown_lines)
            .map(|i| format!("| row {i} | value {i} |"))
            .collect::<Vec<_>>()
            .join("\n");
        json!({
            "url": "https://example.com",
            "rawDump": "x".repeat(3000),
            "aiSchemaVersion": 1,
            "aiSummary": "Example page with a table.",
            "aiMarkdown": md,
            "aiHints": ["hint"],
            "nextActions": [],
        })
    }

    #[test]
    fn small_results_pass_through_unchanged() {
        let env = json!({"aiSummary": "tiny"});
        assert_eq!(format_within_budget(&env, 4000), env.to_string());
    }

    #[test]
    fn oversized_result_drops_raw_payload_first() {
        let out = format_within_budget(&envelope(10), 2000);
        let v: Value = serde_json::from_str(&out).unwrap();
        assert!(v.get("rawDump").is_none());
        assert!(v.get("aiSummary").is_some());
        assert_eq!(v["aiTruncated"], true);
        assert!(out.len() <= 2000);
    }

    #[test]
    fn markdown_truncated_with_notice_when_still_over() {
        let out = format_within_budget(&envelope(300), 1500);
        assert!(out.len() <= 1500);
        let v: Value = serde_json::from_str(&out).unwrap();
        let md = v["aiMarkdown"].as_str().unwrap();
        assert!(md.contains("lines omitted"));
    }

    #[test]
    fn tiny_budget_keeps_summary_only() {
        let out = format_within_budget(&envelope(300), 200);
        assert!(out.len() <= 220);
        let v: Value = serde_json::from_str(&out).unwrap();
        assert!(v.get("aiSummary").is_some());
        assert!(v.get("aiMarkdown").is_none());
    }

    #[test]
    fn zero_budget_means_unlimited() {
        let env = envelope(300);
        assert_eq!(format_within_budget(&env, 0), env.to_string());
    }

    #[test]
    fn truncate_str_respects_char_boundaries() {
        let s = "日本語テキスト";
        let out = truncate_str(s, 7);
        assert!(out.ends_with("..."));
    }
}
