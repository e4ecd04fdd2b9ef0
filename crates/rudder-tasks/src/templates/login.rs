// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

use rudder_runs::{ErrorCode, RunError};

use super::{require_str, surface_call, TemplateCtx};

const DEFAULT_INDICATOR_TIMEOUT_MS: u64 = 10_000;
const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub(super) fn input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "startUrl": { "type": "string" },
            "credentials": {
                "type": "object",
                "description": "{username, password}",
            },
            "fields": {
                "type": "object",
                "description": "{mode: selector|semantic, username, password, submit} — \
                                selector mode resolves exact CSS selectors, semantic \
                                mode matches element roles and accessible names",
            },
            "successIndicator": {
                "type": "object",
                "description": "{type: stable|selector|urlPattern, value?, timeoutMs?}",
            },
        },
        "required": ["startUrl", "credentials", "fields", "successIndicator"],
    })
}

pub(super) fn validate(inputs: &Value) -> Result<u32, RunError> {
    require_str(inputs, "startUrl")?;
    require_str(inputs, "credentials.username")?;
    require_str(inputs, "credentials.password")?;
    let mode = require_str(inputs, "fields.mode")?;
    if mode != "selector" && mode != "semantic" {
        return Err(RunError::invalid_parameter(
            "fields.mode",
            "expected 'selector' or 'semantic'",
        ));
    }
    require_str(inputs, "fields.username")?;
    require_str(inputs, "fields.password")?;
    require_str(inputs, "fields.submit")?;
    let indicator = require_str(inputs, "successIndicator.type")?;
    match indicator {
        "stable" => {}
        "selector" | "urlPattern" => {
            require_str(inputs, "successIndicator.value")?;
        }
        _ => {
            return Err(RunError::invalid_parameter(
                "successIndicator.type",
                "expected stable, selector, or urlPattern",
            ))
        }
    }
    // navigate, fill, submit, verify
    Ok(4)
}

/// Navigate, locate the credential fields, submit, and wait for the
/// success indicator.  The session is preserved for the caller whether or
/// not the login succeeded — a failed attempt is usually retried.
pub(super) async fn execute(inputs: &Value, ctx: &TemplateCtx) -> Result<Value, RunError> {
    let session = ctx
        .session_id
        .clone()
        .ok_or_else(|| RunError::internal("login template started without a session"))?;
    let start_url = require_str(inputs, "startUrl")?;

    let page = surface_call(
        ctx,
        "navigate",
        json!({ "sessionId": session, "url": start_url }),
    )
    .await?;
    ctx.progress.set(1);

    let username_el = locate(ctx, &session, inputs, "username").await?;
    let password_el = locate(ctx, &session, inputs, "password").await?;
    surface_call(
        ctx,
        "type_text",
        json!({
            "sessionId": session,
            "elementId": username_el,
            "text": require_str(inputs, "credentials.username")?,
        }),
    )
    .await?;
    surface_call(
        ctx,
        "type_text",
        json!({
            "sessionId": session,
            "elementId": password_el,
            "text": require_str(inputs, "credentials.password")?,
        }),
    )
    .await?;
    ctx.progress.set(2);

    let submit_el = locate(ctx, &session, inputs, "submit").await?;
    surface_call(
        ctx,
        "click",
        json!({ "sessionId": session, "elementId": submit_el }),
    )
    .await?;
    ctx.progress.set(3);

    let indicator = &inputs["successIndicator"];
    let timeout_ms = indicator["timeoutMs"]
        .as_u64()
        .unwrap_or(DEFAULT_INDICATOR_TIMEOUT_MS);
    let observed = wait_for_indicator(ctx, &session, indicator, timeout_ms).await?;
    ctx.progress.set(4);

    let info = surface_call(ctx, "get_page_info", json!({ "sessionId": session })).await
        .unwrap_or_else(|_| page.clone());

    if observed {
        Ok(json!({
            "success": true,
            "sessionId": session,
            "finalUrl": info["url"],
            "title": info["title"],
            "loginState": "logged_in",
            "cookiesSaved": true,
        }))
    } else {
        let described = indicator["value"]
            .as_str()
            .unwrap_or_else(|| indicator["type"].as_str().unwrap_or("stable"));
        Ok(json!({
            "success": false,
            "sessionId": session,
            "finalUrl": info["url"],
            "title": info["title"],
            "loginState": "unknown",
            "cookiesSaved": false,
            "error": format!(
                "Success indicator '{described}' not observed within {timeout_ms} ms"
            ),
        }))
    }
}

/// Resolve a field address through the `find_element` surface op.
/// `fields.mode` picks the mechanism: `selector` resolves the address as
/// an exact CSS selector, `semantic` matches it against element roles and
/// accessible names.
async fn locate(
    ctx: &TemplateCtx,
    session: &str,
    inputs: &Value,
    field: &str,
) -> Result<u32, RunError> {
    let mode = require_str(inputs, "fields.mode")?;
    let query = require_str(inputs, &format!("fields.{field}"))?;
    let found = surface_call(
        ctx,
        "find_element",
        json!({ "sessionId": session, "query": query, "mode": mode }),
    )
    .await?;
    if found["found"].as_bool() == Some(true) {
        return Ok(found["element"]["id"].as_u64().unwrap_or(0) as u32);
    }
    Err(RunError::new(
        ErrorCode::TplLoginFieldNotFound,
        format!("login field '{field}' not found via '{query}' ({mode})"),
    ))
}

async fn wait_for_indicator(
    ctx: &TemplateCtx,
    session: &str,
    indicator: &Value,
    timeout_ms: u64,
) -> Result<bool, RunError> {
    match indicator["type"].as_str().unwrap_or("stable") {
        "stable" => {
            let out = surface_call(
                ctx,
                "wait_for_stable",
                json!({ "sessionId": session, "timeoutMs": timeout_ms }),
            )
            .await?;
            Ok(out["stable"].as_bool() == Some(true))
        }
        "selector" => {
            // The indicator value is a CSS selector by definition here.
            let value = indicator["value"].as_str().unwrap_or_default();
            poll(ctx, timeout_ms, || async {
                let found = surface_call(
                    ctx,
                    "find_element",
                    json!({ "sessionId": session, "query": value, "mode": "selector" }),
                )
                .await?;
                Ok(found["found"].as_bool() == Some(true))
            })
            .await
        }
        "urlPattern" => {
            let value = indicator["value"].as_str().unwrap_or_default();
            poll(ctx, timeout_ms, || async {
                let info =
                    surface_call(ctx, "get_page_info", json!({ "sessionId": session })).await?;
                Ok(info["url"].as_str().map_or(false, |u| u.contains(value)))
            })
            .await
        }
        other => {
            debug!(indicator = other, "unknown success indicator type");
            Ok(false)
        }
    }
}

/// Poll `check` until it reports true or the timeout lapses, honoring the
/// run's cancel token between probes.
async fn poll<F, Fut>(ctx: &TemplateCtx, timeout_ms: u64, check: F) -> Result<bool, RunError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<bool, RunError>>,
{
    let deadline = std::time::Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if check().await? {
            return Ok(true);
        }
        if std::time::Instant::now() >= deadline {
            return Ok(false);
        }
        ctx.cancel.sleep(POLL_INTERVAL).await?;
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_inputs() -> Value {
        json!({
            "startUrl": "https://login.test/",
            "credentials": { "username": "alice", "password": "s3cret" },
            "fields": {
                "mode": "semantic",
                "username": "username",
                "password": "password",
                "submit": "sign in",
            },
            "successIndicator": { "type": "urlPattern", "value": "/home" },
        })
    }

    #[test]
    fn validate_accepts_full_inputs() {
        assert_eq!(validate(&valid_inputs()).unwrap(), 4);
    }

    #[test]
    fn validate_names_missing_fields() {
        let mut inputs = valid_inputs();
        inputs["credentials"]
            .as_object_mut()
            .unwrap()
            .remove("password");
        let err = validate(&inputs).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParameter);
        assert!(err.message.contains("credentials.password"));
    }

    #[test]
    fn validate_rejects_unknown_mode() {
        let mut inputs = valid_inputs();
        inputs["fields"]["mode"] = json!("xpath");
        assert!(validate(&inputs).is_err());
    }

    #[test]
    fn validate_requires_value_for_selector_indicator() {
        let mut inputs = valid_inputs();
        inputs["successIndicator"] = json!({ "type": "selector" });
        let err = validate(&inputs).unwrap_err();
        assert!(err.message.contains("successIndicator.value"));
    }

    #[test]
    fn validate_allows_stable_without_value() {
        let mut inputs = valid_inputs();
        inputs["successIndicator"] = json!({ "type": "stable" });
        assert!(validate(&inputs).is_ok());
    }
}
