// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde_json::{json, Value};
use tracing::debug;

use rudder_runs::RunError;

use super::{surface_call, url_list, TemplateCtx};

const MAX_URLS: usize = 50;

pub(super) fn input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "urls": { "type": "array", "description": "1..50 URLs to visit" },
            "concurrency": { "type": "integer", "description": "Reserved; extraction is sequential per session" },
            "extract": {
                "type": "object",
                "description": "{pageInfo?: bool, content?: bool} — both default true",
            },
        },
        "required": ["urls"],
    })
}

pub(super) fn validate(inputs: &Value) -> Result<u32, RunError> {
    let urls = url_list(inputs, 1, MAX_URLS)?;
    if let Some(c) = inputs.get("concurrency") {
        let c = c
            .as_u64()
            .ok_or_else(|| RunError::invalid_parameter("concurrency", "expected integer"))?;
        if !(1..=8).contains(&c) {
            return Err(RunError::invalid_parameter("concurrency", "expected 1..8"));
        }
    }
    if let Some(extract) = inputs.get("extract") {
        if !extract.is_object() {
            return Err(RunError::invalid_parameter("extract", "expected object"));
        }
    }
    Ok(urls.len() as u32)
}

/// Visit every URL in a fresh tab of the run's session, extract what was
/// asked, and report per-URL outcomes plus the grading summary.  A failing
/// URL is recorded and skipped; it never fails the run as a whole.
pub(super) async fn execute(inputs: &Value, ctx: &TemplateCtx) -> Result<Value, RunError> {
    let urls = url_list(inputs, 1, MAX_URLS)?;
    let session = ctx
        .session_id
        .clone()
        .ok_or_else(|| RunError::internal("batch template started without a session"))?;
    let want_info = inputs["extract"]["pageInfo"].as_bool().unwrap_or(true);
    let want_content = inputs["extract"]["content"].as_bool().unwrap_or(true);

    let mut results = Vec::with_capacity(urls.len());
    let mut succeeded = 0usize;

    for (i, url) in urls.iter().enumerate() {
        ctx.cancel.check()?;
        match extract_one(ctx, &session, url, want_info, want_content).await {
            Ok(entry) => {
                succeeded += 1;
                results.push(entry);
            }
            Err(e) => {
                debug!(url = %url, "batch extraction failed: {e}");
                results.push(json!({
                    "url": url,
                    "success": false,
                    "error": e.message,
                    "errorCode": e.code,
                }));
            }
        }
        ctx.progress.set((i + 1) as u32);
    }

    Ok(json!({
        "results": results,
        "summary": {
            "total": urls.len(),
            "succeeded": succeeded,
            "failed": urls.len() - succeeded,
        },
    }))
}

async fn extract_one(
    ctx: &TemplateCtx,
    session: &str,
    url: &str,
    want_info: bool,
    want_content: bool,
) -> Result<Value, RunError> {
    let tab = surface_call(ctx, "create_tab", json!({ "sessionId": session, "url": url })).await?;
    let tab_id = tab["tab"]["id"].as_str().unwrap_or_default().to_string();

    let mut entry = json!({
        "url": url,
        "success": true,
        "title": tab["tab"]["title"],
    });

    if want_info {
        let info = surface_call(ctx, "get_page_info", json!({ "sessionId": session })).await?;
        entry["headings"] = info["headings"].clone();
        entry["elementCount"] = json!(info["elements"]
            .as_array()
            .map(|a| a.len())
            .unwrap_or(0));
    }
    if want_content {
        let content =
            surface_call(ctx, "get_page_content", json!({ "sessionId": session })).await?;
        entry["content"] = content["text"].clone();
    }

    // The tab is closed on the success path only; a failed URL's tab dies
    // with the session at run teardown.
    if !tab_id.is_empty() {
        let _ = surface_call(
            ctx,
            "close_tab",
            json!({ "sessionId": session, "tabId": tab_id }),
        )
        .await;
    }
    Ok(entry)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validate_accepts_url_list() {
        let units = validate(&json!({"urls": ["https://a", "https://b"]})).unwrap();
        assert_eq!(units, 2);
    }

    #[test]
    fn validate_rejects_empty_and_oversized() {
        assert!(validate(&json!({"urls": []})).is_err());
        let too_many: Vec<String> = (0..51).map(|i| format!("https://u{i}")).collect();
        let err = validate(&json!({ "urls": too_many })).unwrap_err();
        assert!(err.message.contains("urls"));
    }

    #[test]
    fn validate_rejects_non_string_entries() {
        assert!(validate(&json!({"urls": ["https://a", 42]})).is_err());
    }

    #[test]
    fn validate_bounds_concurrency() {
        assert!(validate(&json!({"urls": ["https://a"], "concurrency": 4})).is_ok());
        assert!(validate(&json!({"urls": ["https://a"], "concurrency": 0})).is_err());
        assert!(validate(&json!({"urls": ["https://a"], "concurrency": 9})).is_err());
    }
}
