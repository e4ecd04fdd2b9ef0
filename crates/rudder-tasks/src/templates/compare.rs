// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use tracing::debug;

use rudder_runs::RunError;

use super::{surface_call, url_list, TemplateCtx};

const MIN_URLS: usize = 2;
const MAX_URLS: usize = 10;
/// Parallel snapshot cap: each URL gets its own short-lived session.
const SNAPSHOT_CONCURRENCY: usize = 4;

const DEFAULT_FIELDS: &[&str] = &["title", "headings", "canonicalUrl"];

pub(super) fn input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "urls": { "type": "array", "description": "2..10 URLs to compare" },
            "extract": {
                "type": "object",
                "description": "{pageInfo: bool} — must not be false; comparison reads structure",
            },
            "compare": {
                "type": "object",
                "description": "{fields?: [string]} — defaults to title, headings, canonicalUrl",
            },
        },
        "required": ["urls"],
    })
}

pub(super) fn validate(inputs: &Value) -> Result<u32, RunError> {
    let urls = url_list(inputs, MIN_URLS, MAX_URLS)?;
    // Comparison reads element structure, so page info cannot be opted out.
    if inputs["extract"]["pageInfo"].as_bool() == Some(false) {
        return Err(RunError::invalid_parameter(
            "extract.pageInfo",
            "must not be false; comparison requires page structure",
        ));
    }
    if let Some(fields) = inputs["compare"].get("fields") {
        if !fields.is_array() {
            return Err(RunError::invalid_parameter(
                "compare.fields",
                "expected array of field names",
            ));
        }
    }
    Ok(urls.len() as u32 + 1)
}

/// Snapshot each URL in parallel (own session per URL, bounded), then diff
/// the named fields across the successful snapshots.
pub(super) async fn execute(inputs: &Value, ctx: &TemplateCtx) -> Result<Value, RunError> {
    let urls = url_list(inputs, MIN_URLS, MAX_URLS)?;
    let fields: Vec<String> = inputs["compare"]["fields"]
        .as_array()
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_else(|| DEFAULT_FIELDS.iter().map(|s| s.to_string()).collect());

    let snapshots: Vec<Value> = stream::iter(urls.iter().cloned().enumerate())
        .map(|(i, url)| async move {
            let snap = snapshot(ctx, &url).await;
            ctx.progress.set((i + 1) as u32);
            match snap {
                Ok(v) => v,
                Err(e) => {
                    debug!(url = %url, "snapshot failed: {e}");
                    json!({ "url": url, "success": false, "error": e.message, "errorCode": e.code })
                }
            }
        })
        .buffered(SNAPSHOT_CONCURRENCY)
        .collect()
        .await;

    let succeeded: Vec<&Value> = snapshots
        .iter()
        .filter(|s| s["success"].as_bool() == Some(true))
        .collect();

    let diffs = if succeeded.len() < 2 {
        json!([])
    } else {
        json!(fields
            .iter()
            .map(|field| diff_field(field, &succeeded))
            .collect::<Vec<Value>>())
    };

    ctx.progress.set(urls.len() as u32 + 1);
    Ok(json!({
        "snapshots": snapshots,
        "diffs": diffs,
        "summary": {
            "total": urls.len(),
            "succeeded": succeeded.len(),
            "failed": urls.len() - succeeded.len(),
        },
    }))
}

/// One URL, one throwaway session; always closed, even on failure.
async fn snapshot(ctx: &TemplateCtx, url: &str) -> Result<Value, RunError> {
    let created = surface_call(ctx, "create_session", json!({})).await?;
    let session = created["sessionId"].as_str().unwrap_or_default().to_string();

    let result = async {
        surface_call(ctx, "navigate", json!({ "sessionId": session, "url": url })).await?;
        surface_call(ctx, "get_page_info", json!({ "sessionId": session })).await
    }
    .await;

    let _ = surface_call(ctx, "close_session", json!({ "sessionId": session })).await;

    let info = result?;
    Ok(json!({
        "url": url,
        "success": true,
        "title": info["title"],
        "headings": info["headings"],
        "canonicalUrl": info["canonicalUrl"],
        "elementCount": info["elements"].as_array().map(|a| a.len()).unwrap_or(0),
    }))
}

fn diff_field(field: &str, snapshots: &[&Value]) -> Value {
    let values: Vec<Value> = snapshots
        .iter()
        .map(|s| {
            json!({
                "url": s["url"],
                "value": s.get(field).cloned().unwrap_or(Value::Null),
            })
        })
        .collect();
    let identical = values
        .windows(2)
        .all(|pair| pair[0]["value"] == pair[1]["value"]);
    json!({
        "field": field,
        "identical": identical,
        "values": values,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
