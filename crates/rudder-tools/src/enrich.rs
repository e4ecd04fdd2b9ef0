// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::{json, Map, Value};

use rudder_config::{DetailLevel, EnrichmentConfig};

use crate::tool::ToolOutput;

pub const AI_SCHEMA_VERSION: u64 = 1;

/// Maximum characters in `aiSummary`.
const SUMMARY_CAP: usize = 200;

/// Transforms raw tool results into the standard enrichment envelope:
/// summary, markdown, hints, normalized next actions, per-key delta
/// summaries, and schema repair guidance.
///
/// The enricher is stateful only for deltas: it remembers the last
/// snapshot per (tool, distinguishing arg) so the next call can report
/// what changed.  Everything else is a pure function of the input.
pub struct Enricher {
    default_detail: DetailLevel,
    adaptive: bool,
    deltas: Mutex<HashMap<String, Value>>,
}

impl Enricher {
    pub fn new(cfg: &EnrichmentConfig) -> Self {
        Self {
            default_detail: cfg.detail_level,
            adaptive: cfg.adaptive_policy,
            deltas: Mutex::new(HashMap::new()),
        }
    }

    /// Enrich one tool result.  Enriching an already-enriched payload is
    /// idempotent: envelope fields are kept stable and only `deltaSummary`
    /// is refreshed.
    pub fn enrich(&self, tool_name: &str, args: &Value, output: &ToolOutput) -> Value {
        let mut base = match &output.value {
            Value::Object(m) => m.clone(),
            other => {
                let mut m = Map::new();
                m.insert("value".to_string(), other.clone());
                m
            }
        };

        let delta_key = delta_key(tool_name, args);

        if base.contains_key("aiSchemaVersion") {
            let delta = self.delta_for(&delta_key, &base);
            base.insert("deltaSummary".to_string(), delta);
            return Value::Object(base);
        }

        let (detail, policy) = self.effective_detail(tool_name, &base, output.is_error);

        let summary = truncate_summary(&build_summary(tool_name, &base, output.is_error));
        let markdown = build_markdown(tool_name, &base, detail, &summary);
        let hints = build_hints(tool_name, &base, output);
        let actions = normalize_actions(build_actions(tool_name, args, &base, output));
        let delta = self.delta_for(&delta_key, &base);

        base.insert("aiSchemaVersion".to_string(), json!(AI_SCHEMA_VERSION));
        base.insert("aiDetailLevel".to_string(), json!(detail.as_str()));
        base.insert("aiSummary".to_string(), json!(summary));
        base.insert("aiMarkdown".to_string(), json!(markdown));
        base.insert("aiHints".to_string(), json!(hints));
        base.insert("nextActions".to_string(), json!(actions));
        base.insert("deltaSummary".to_string(), delta);
        if let Some(p) = policy {
            base.insert("aiDetailPolicy".to_string(), p);
        }
        if let Some(guidance) = repair_guidance(&base) {
            base.insert("schemaRepairGuidance".to_string(), guidance);
        }

        Value::Object(base)
    }

    /// Detail level for this result.  An explicit `aiDetailLevel` in the
    /// raw payload wins; then the adaptive policy; then the configured
    /// default.
    fn effective_detail(
        &self,
        tool_name: &str,
        base: &Map<String, Value>,
        is_error: bool,
    ) -> (DetailLevel, Option<Value>) {
        if let Some(explicit) = base.get("aiDetailLevel").and_then(Value::as_str) {
            let level = match explicit {
                "brief" => DetailLevel::Brief,
                "full" => DetailLevel::Full,
                _ => DetailLevel::Normal,
            };
            return (
                level,
                Some(json!({
                    "mode": level.as_str(),
                    "reason": "explicit aiDetailLevel in payload",
                    "source": "payload",
                })),
            );
        }

        if self.adaptive && tool_name == "get_task_run" {
            let status = base.get("status").and_then(Value::as_str).unwrap_or("");
            let terminal = matches!(
                status,
                "succeeded" | "partial_success" | "failed" | "canceled"
            );
            if !terminal && !is_error {
                return (
                    DetailLevel::Brief,
                    Some(json!({
                        "mode": "brief",
                        "reason": "polling a non-terminal run",
                        "source": "adaptive",
                    })),
                );
            }
            if status == "failed" {
                return (
                    DetailLevel::Full,
                    Some(json!({
                        "mode": "full",
                        "reason": "run reached a failure terminal",
                        "source": "adaptive",
                    })),
                );
            }
        }

        (self.default_detail, None)
    }

    fn delta_for(&self, key: &str, base: &Map<String, Value>) -> Value {
        let snapshot = snapshot_fields(base);
        let mut deltas = self.deltas.lock().unwrap();
        let changes = match deltas.get(key) {
            None => vec!["initial snapshot".to_string()],
            Some(prev) => diff_snapshots(prev, &snapshot),
        };
        deltas.insert(key.to_string(), snapshot);
        json!({ "key": key, "changes": changes })
    }
}

/// Key the delta memory on the tool plus its distinguishing argument so
/// polling different runs (or sessions) does not cross-talk.
fn delta_key(tool_name: &str, args: &Value) -> String {
    let discriminator = args
        .get("runId")
        .or_else(|| args.get("sessionId"))
        .or_else(|| args.get("url"))
        .and_then(Value::as_str)
        .unwrap_or("");
    format!("{tool_name}:{discriminator}")
}

fn snapshot_fields(base: &Map<String, Value>) -> Value {
    json!({
        "status": base.get("status").cloned().unwrap_or(Value::Null),
        "doneSteps": base
            .get("progress")
            .and_then(|p| p.get("doneSteps"))
            .cloned()
            .unwrap_or(Value::Null),
        "artifactCount": base
            .get("artifactIds")
            .and_then(Value::as_array)
            .map(|a| a.len())
            .unwrap_or(0),
        "errorCode": base.get("errorCode").cloned().unwrap_or(Value::Null),
        "elementCount": base
            .get("elements")
            .and_then(Value::as_array)
            .map(|a| a.len())
            .unwrap_or(0),
        "title": base.get("title").cloned().unwrap_or(Value::Null),
    })
}

fn diff_snapshots(prev: &Value, next: &Value) -> Vec<String> {
    let mut changes = Vec::new();
    if prev["status"] != next["status"] && !next["status"].is_null() {
        changes.push(format!(
            "status changed {} -> {}",
            prev["status"].as_str().unwrap_or("none"),
            next["status"].as_str().unwrap_or("none")
        ));
    }
    if prev["doneSteps"] != next["doneSteps"] && !next["doneSteps"].is_null() {
        changes.push(format!(
            "progress advanced {} -> {}",
            prev["doneSteps"], next["doneSteps"]
        ));
    }
    let (pa, na) = (
        prev["artifactCount"].as_u64().unwrap_or(0),
        next["artifactCount"].as_u64().unwrap_or(0),
    );
    if na > pa {
        changes.push(format!("{} new artifact(s)", na - pa));
    }
    if prev["errorCode"] != next["errorCode"] && !next["errorCode"].is_null() {
        changes.push(format!(
            "new error class {}",
            next["errorCode"].as_str().unwrap_or("unknown")
        ));
    }
    if prev["elementCount"] != next["elementCount"]
        && next["elementCount"].as_u64().unwrap_or(0) > 0
    {
        changes.push(format!(
            "element count changed {} -> {}",
            prev["elementCount"], next["elementCount"]
        ));
    }
    if prev["title"] != next["title"] && !next["title"].is_null() {
        changes.push("page title changed".to_string());
    }
    if changes.is_empty() {
        changes.push("no changes since previous call".to_string());
    }
    changes
}

// ─── Summary / markdown builders ─────────────────────────────────────────────

fn build_summary(tool_name: &str, base: &Map<String, Value>, is_error: bool) -> String {
    if is_error {
        let msg = base.get("error").and_then(Value::as_str).unwrap_or("failed");
        let code = base
            .get("errorCode")
            .and_then(Value::as_str)
            .unwrap_or("UNCODED");
        return format!("{tool_name} failed ({code}): {msg}");
    }

    let title = base.get("title").and_then(Value::as_str);
    let url = base.get("url").and_then(Value::as_str);
    let element_count = base
        .get("elements")
        .and_then(Value::as_array)
        .map(|a| a.len());

    if let (Some(title), Some(url)) = (title, url) {
        return match element_count {
            Some(n) => format!("Page '{title}' at {url} with {n} interactive elements."),
            None => format!("Page '{title}' at {url}."),
        };
    }
    if let Some(status) = base.get("status").and_then(Value::as_str) {
        let done = base
            .get("progress")
            .and_then(|p| p.get("doneSteps"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let total = base
            .get("progress")
            .and_then(|p| p.get("totalSteps"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let id = base.get("id").and_then(Value::as_str).unwrap_or("run");
        return format!("Run {id} is {status}, progress {done}/{total}.");
    }
    if let Some(summary) = base.get("summary") {
        let total = summary.get("total").and_then(Value::as_u64).unwrap_or(0);
        let ok = summary.get("succeeded").and_then(Value::as_u64).unwrap_or(0);
        return format!("{tool_name}: {ok}/{total} units succeeded.");
    }
    if let Some(entries) = base.get("entries").and_then(Value::as_array) {
        let more = if base.get("hasMore").and_then(Value::as_bool) == Some(true) {
            " (more available)"
        } else {
            ""
        };
        return format!("{} entries returned{more}.", entries.len());
    }
    if let Some(text) = base.get("text").and_then(Value::as_str) {
        return format!("Extracted {} characters of page text.", text.len());
    }
    format!("{tool_name} completed.")
}

fn build_markdown(
    tool_name: &str,
    base: &Map<String, Value>,
    detail: DetailLevel,
    summary: &str,
) -> String {
    let mut md = format!("## {tool_name}\n\n{summary}\n");
    if detail == DetailLevel::Brief {
        // Brief strips tables and element lists.
        return md;
    }

    let row_cap = if detail == DetailLevel::Full { 15 } else { 8 };

    if let Some(elements) = base.get("elements").and_then(Value::as_array) {
        md.push_str("\n### Elements\n\n| id | role | name |\n|---|---|---|\n");
        for e in elements.iter().take(row_cap) {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                e.get("id").and_then(Value::as_u64).unwrap_or(0),
                e.get("role").and_then(Value::as_str).unwrap_or(""),
                e.get("name").and_then(Value::as_str).unwrap_or("")
            ));
        }
        if elements.len() > row_cap {
            md.push_str(&format!("\n{} more elements omitted.\n", elements.len() - row_cap));
        }
    }

    if let Some(headings) = base.get("headings").and_then(Value::as_array) {
        if !headings.is_empty() {
            md.push_str("\n### Headings\n\n");
            for h in headings.iter().take(row_cap) {
                md.push_str(&format!("- {}\n", h.as_str().unwrap_or("")));
            }
        }
    }

    if let Some(entries) = base.get("entries").and_then(Value::as_array) {
        md.push_str("\n### Entries\n\n");
        for e in entries.iter().take(row_cap) {
            md.push_str(&format!("- {}\n", compact_entry(e)));
        }
        if entries.len() > row_cap {
            md.push_str(&format!("\n{} more entries omitted.\n", entries.len() - row_cap));
        }
    }

    if let Some(text) = base.get("text").and_then(Value::as_str) {
        let cap = if detail == DetailLevel::Full { 2000 } else { 600 };
        let mut snippet = text.chars().take(cap).collect::<String>();
        if text.chars().count() > cap {
            snippet.push_str("…");
        }
        md.push_str(&format!("\n### Text\n\n{snippet}\n"));
    }

    md
}

fn compact_entry(e: &Value) -> String {
    if let Some(s) = e.as_str() {
        return s.to_string();
    }
    let level = e.get("level").and_then(Value::as_str);
    let text = e.get("text").and_then(Value::as_str);
    if let (Some(level), Some(text)) = (level, text) {
        return format!("[{level}] {text}");
    }
    let method = e.get("method").and_then(Value::as_str);
    let url = e.get("url").and_then(Value::as_str);
    if let (Some(method), Some(url)) = (method, url) {
        let status = e
            .get("status")
            .and_then(Value::as_u64)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".into());
        return format!("{method} {url} -> {status}");
    }
    e.to_string()
}

// ─── Hints and next actions ──────────────────────────────────────────────────

fn build_hints(_tool_name: &str, base: &Map<String, Value>, output: &ToolOutput) -> Vec<String> {
    let mut hints = Vec::new();
    if output.is_error {
        match output.error_code() {
            Some("ELEMENT_NOT_FOUND") => hints.push(
                "Element ids go stale after navigation; call get_page_info to refresh them."
                    .to_string(),
            ),
            Some("NAVIGATION_TIMEOUT") => hints.push(
                "The page did not settle; consider wait_for_stable or a simpler URL.".to_string(),
            ),
            Some("SESSION_NOT_FOUND") => hints
                .push("The session is gone; create_session starts a fresh one.".to_string()),
            _ => {}
        }
    }
    if base.get("hasMore").and_then(Value::as_bool) == Some(true) {
        hints.push("More entries are available; follow nextActions to page through.".to_string());
    }
    if base.get("dialog").map_or(false, |d| !d.is_null()) {
        hints.push("A dialog is open and blocks the page until handled.".to_string());
    }
    hints
}

fn build_actions(
    tool_name: &str,
    args: &Value,
    base: &Map<String, Value>,
    output: &ToolOutput,
) -> Vec<Value> {
    let mut actions = Vec::new();
    let session = args.get("sessionId").cloned().unwrap_or(Value::Null);

    if base.get("hasMore").and_then(Value::as_bool) == Some(true) {
        let mut cont = args.clone();
        if let Some(cursor) = base.get("cursor") {
            cont["cursor"] = cursor.clone();
        }
        actions.push(json!({
            "tool": tool_name,
            "args": cont,
            "priority": "medium",
            "reason": "More entries remain after this page",
        }));
    }

    if output.is_error {
        match output.error_code() {
            Some("ELEMENT_NOT_FOUND") => actions.push(json!({
                "tool": "get_page_info",
                "args": { "sessionId": session },
                "priority": "high",
                "reason": "Refresh the element list before retrying the action",
            })),
            Some("NAVIGATION_TIMEOUT") => actions.push(json!({
                "tool": "wait_for_stable",
                "args": { "sessionId": session, "timeoutMs": 5000 },
                "priority": "medium",
                "reason": "Give the page time to settle, then retry",
            })),
            _ => {}
        }
    }

    if tool_name == "get_task_run" {
        let status = base.get("status").and_then(Value::as_str).unwrap_or("");
        if matches!(status, "queued" | "running") {
            actions.push(json!({
                "tool": "get_task_run",
                "args": args.clone(),
                "priority": "low",
                "reason": "The run is still in flight; poll again shortly",
            }));
        }
    }

    if base.get("dialog").map_or(false, |d| !d.is_null()) {
        actions.push(json!({
            "tool": "handle_dialog",
            "args": { "sessionId": session, "accept": true },
            "priority": "high",
            "reason": "Dismiss the blocking dialog to continue",
        }));
    }

    actions
}

/// Normalize next actions: every reason ends with sentence punctuation,
/// every priority is one of high/medium/low, and duplicates by
/// `(tool, args)` are removed.
fn normalize_actions(actions: Vec<Value>) -> Vec<Value> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for mut action in actions {
        let tool = action
            .get("tool")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let args_key = action.get("args").map(Value::to_string).unwrap_or_default();
        if !seen.insert((tool, args_key)) {
            continue;
        }

        let priority = action.get("priority").and_then(Value::as_str).unwrap_or("");
        if !matches!(priority, "high" | "medium" | "low") {
            action["priority"] = json!("medium");
        }

        let reason = action
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("Suggested follow-up")
            .trim()
            .to_string();
        let reason = if reason.ends_with('.') || reason.ends_with('!') || reason.ends_with('?') {
            reason
        } else {
            format!("{reason}.")
        };
        action["reason"] = json!(reason);

        out.push(action);
    }
    out
}

// ─── Schema repair guidance ──────────────────────────────────────────────────

/// When the payload carries a failing `verification` record, recommend the
/// follow-up tool calls that can fill the gaps: textual fields come from
/// page content, structural fields from page info.
fn repair_guidance(base: &Map<String, Value>) -> Option<Value> {
    let verification = base.get("verification")?;
    if verification.get("pass").and_then(Value::as_bool) != Some(false) {
        return None;
    }
    let missing: Vec<String> = verification
        .get("missingFields")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    let mismatches = verification
        .get("typeMismatches")
        .cloned()
        .unwrap_or_else(|| json!([]));

    let mut checks = Vec::new();
    for field in &missing {
        let structural = field.contains("element")
            || field.contains("heading")
            || field.contains("link")
            || field.contains("structure");
        checks.push(json!({
            "tool": if structural { "get_page_info" } else { "get_page_content" },
            "reason": format!("Field '{field}' is missing from the result."),
        }));
    }

    Some(json!({
        "missing": missing,
        "typeMismatches": mismatches,
        "recommendedChecks": checks,
    }))
}

fn truncate_summary(s: &str) -> String {
    if s.len() <= SUMMARY_CAP {
        return s.to_string();
    }
    let mut cut = SUMMARY_CAP - 1;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &s[..cut])
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn enricher() -> Enricher {
        Enricher::new(&EnrichmentConfig {
            detail_level: DetailLevel::Normal,
            adaptive_policy: true,
        })
    }

    fn page_output() -> ToolOutput {
        ToolOutput::ok(
            "1",
            json!({
                "url": "https://example.com",
                "title": "Example",
                "elements": [
                    {"id": 1, "role": "link", "name": "More"},
                    {"id": 2, "role": "button", "name": "Go"},
                ],
                "headings": ["Example Domain"],
            }),
        )
    }

    // ── Envelope shape ────────────────────────────────────────────────────

    #[test]
    fn envelope_has_all_standard_fields() {
        let env = enricher().enrich("get_page_info", &json!({"sessionId": "s"}), &page_output());
        for key in [
            "aiSchemaVersion",
            "aiDetailLevel",
            "aiSummary",
            "aiMarkdown",
            "aiHints",
            "nextActions",
            "deltaSummary",
        ] {
            assert!(env.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn summary_is_bounded_to_200_chars() {
        let out = ToolOutput::ok(
            "1",
            json!({"url": "https://example.com", "title": "T".repeat(400)}),
        );
        let env = enricher().enrich("navigate", &json!({}), &out);
        assert!(env["aiSummary"].as_str().unwrap().len() <= SUMMARY_CAP + 3);
    }

    #[test]
    fn markdown_has_heading_and_element_table() {
        let env = enricher().enrich("get_page_info", &json!({}), &page_output());
        let md = env["aiMarkdown"].as_str().unwrap();
        assert!(md.contains("## get_page_info"));
        assert!(md.contains("| id | role | name |"));
        assert!(md.contains("| 1 | link | More |"));
    }

    #[test]
    fn brief_detail_strips_tables() {
        let e = Enricher::new(&EnrichmentConfig {
            detail_level: DetailLevel::Brief,
            adaptive_policy: false,
        });
        let env = e.enrich("get_page_info", &json!({}), &page_output());
        assert!(!env["aiMarkdown"].as_str().unwrap().contains("| id |"));
    }

    // ── Idempotence ───────────────────────────────────────────────────────

    #[test]
    fn enriching_an_envelope_is_idempotent_except_delta() {
        let e = enricher();
        let args = json!({"sessionId": "s"});
        let first = e.enrich("get_page_info", &args, &page_output());
        let second = e.enrich(
            "get_page_info",
            &args,
            &ToolOutput::ok("2", first.clone()),
        );
        assert_eq!(first["aiSummary"], second["aiSummary"]);
        assert_eq!(first["aiMarkdown"], second["aiMarkdown"]);
        assert_eq!(first["aiDetailLevel"], second["aiDetailLevel"]);
        assert_ne!(first["deltaSummary"], second["deltaSummary"]);
    }

    // ── Detail policy ─────────────────────────────────────────────────────

    #[test]
    fn polling_nonterminal_run_downgrades_to_brief() {
        let out = ToolOutput::ok(
            "1",
            json!({"id": "run_1", "status": "running", "progress": {"doneSteps": 1, "totalSteps": 3}}),
        );
        let env = enricher().enrich("get_task_run", &json!({"runId": "run_1"}), &out);
        assert_eq!(env["aiDetailLevel"], "brief");
        assert_eq!(env["aiDetailPolicy"]["source"], "adaptive");
    }

    #[test]
    fn failed_terminal_run_upgrades_to_full() {
        let out = ToolOutput::ok("1", json!({"id": "run_1", "status": "failed"}));
        let env = enricher().enrich("get_task_run", &json!({"runId": "run_1"}), &out);
        assert_eq!(env["aiDetailLevel"], "full");
    }

    #[test]
    fn explicit_detail_level_wins_over_adaptive() {
        let out = ToolOutput::ok(
            "1",
            json!({"id": "r", "status": "running", "aiDetailLevel": "full"}),
        );
        let env = enricher().enrich("get_task_run", &json!({"runId": "r"}), &out);
        assert_eq!(env["aiDetailLevel"], "full");
        assert_eq!(env["aiDetailPolicy"]["source"], "payload");
    }

    // ── Next actions ──────────────────────────────────────────────────────

    #[test]
    fn has_more_emits_cursor_continuation() {
        let out = ToolOutput::ok(
            "1",
            json!({"entries": ["a"], "hasMore": true, "cursor": 40}),
        );
        let env = enricher().enrich(
            "get_console_logs",
            &json!({"sessionId": "s"}),
            &out,
        );
        let actions = env["nextActions"].as_array().unwrap();
        assert!(actions.iter().any(|a| {
            a["tool"] == "get_console_logs" && a["args"]["cursor"] == 40
        }));
    }

    #[test]
    fn actions_are_normalized_and_deduped() {
        let out = ToolOutput::err(
            "1",
            rudder_runs::RunError::new(rudder_runs::ErrorCode::ElementNotFound, "gone"),
        );
        let env = enricher().enrich("click", &json!({"sessionId": "s"}), &out);
        let actions = env["nextActions"].as_array().unwrap();
        for a in actions {
            let reason = a["reason"].as_str().unwrap();
            assert!(
                reason.ends_with('.') || reason.ends_with('!') || reason.ends_with('?'),
                "unpunctuated reason: {reason}"
            );
            assert!(matches!(
                a["priority"].as_str().unwrap(),
                "high" | "medium" | "low"
            ));
        }
        let mut keys: Vec<String> = actions
            .iter()
            .map(|a| format!("{}{}", a["tool"], a["args"]))
            .collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), actions.len());
    }

    // ── Delta summary ─────────────────────────────────────────────────────

    #[test]
    fn first_call_reports_initial_snapshot() {
        let env = enricher().enrich("get_task_run", &json!({"runId": "r1"}), &run_output("running", 0));
        assert_eq!(env["deltaSummary"]["changes"][0], "initial snapshot");
    }

    #[test]
    fn progress_advance_is_reported() {
        let e = enricher();
        let args = json!({"runId": "r1"});
        e.enrich("get_task_run", &args, &run_output("running", 1));
        let env = e.enrich("get_task_run", &args, &run_output("running", 2));
        let changes = env["deltaSummary"]["changes"].as_array().unwrap();
        assert!(changes
            .iter()
            .any(|c| c.as_str().unwrap().contains("progress advanced")));
    }

    #[test]
    fn delta_memory_is_keyed_per_run() {
        let e = enricher();
        e.enrich("get_task_run", &json!({"runId": "r1"}), &run_output("running", 1));
        let env = e.enrich("get_task_run", &json!({"runId": "r2"}), &run_output("running", 1));
        assert_eq!(env["deltaSummary"]["changes"][0], "initial snapshot");
    }

    fn run_output(status: &str, done: u64) -> ToolOutput {
        ToolOutput::ok(
            "1",
            json!({"id": "r", "status": status, "progress": {"doneSteps": done, "totalSteps": 5}}),
        )
    }

    // ── Repair guidance ───────────────────────────────────────────────────

    #[test]
    fn failing_verification_adds_repair_guidance() {
        let out = ToolOutput::ok(
            "1",
            json!({
                "result": {},
                "verification": {
                    "pass": false,
                    "missingFields": ["title", "elementCount"],
                    "typeMismatches": [],
                }
            }),
        );
        let env = enricher().enrich("get_task_run", &json!({"runId": "r"}), &out);
        let guidance = &env["schemaRepairGuidance"];
        assert_eq!(guidance["missing"][0], "title");
        let checks = guidance["recommendedChecks"].as_array().unwrap();
        assert!(checks.iter().any(|c| c["tool"] == "get_page_content"));
        assert!(checks.iter().any(|c| c["tool"] == "get_page_info"));
    }

    #[test]
    fn passing_verification_adds_no_guidance() {
        let out = ToolOutput::ok("1", json!({"verification": {"pass": true}}));
        let env = enricher().enrich("get_task_run", &json!({}), &out);
        assert!(env.get("schemaRepairGuidance").is_none());
    }
}
