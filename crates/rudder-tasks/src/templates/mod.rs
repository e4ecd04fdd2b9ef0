// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The closed template set.  Each template validates its inputs before a
//! run id exists and then expands into tool-call sequences against the
//! tool surface.

mod batch;
mod compare;
mod login;

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use rudder_runs::{CancelToken, ErrorCode, ProgressHandle, RunError};
use rudder_tools::{ToolCall, ToolRegistry};

use crate::events::TaskEvent;

pub const BATCH_EXTRACT_PAGES: &str = "batch_extract_pages";
pub const LOGIN_KEEP_SESSION: &str = "login_keep_session";
pub const MULTI_TAB_COMPARE: &str = "multi_tab_compare";

/// Static description of one template, surfaced by `list_task_templates`.
#[derive(Debug, Clone)]
pub struct TemplateDescriptor {
    pub id: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
    /// Needs a browser session created for it when the caller supplies none.
    pub needs_session: bool,
    /// A successful run keeps its session alive for the caller.
    pub session_preserving: bool,
    /// Gated on `trust_level = local`.
    pub requires_local_trust: bool,
}

pub fn descriptors() -> Vec<TemplateDescriptor> {
    vec![
        TemplateDescriptor {
            id: BATCH_EXTRACT_PAGES,
            description: "Visit each URL in a fresh tab and extract page info and/or \
                          readable content. Per-URL failures never fail the whole run.",
            input_schema: batch::input_schema(),
            needs_session: true,
            session_preserving: false,
            requires_local_trust: false,
        },
        TemplateDescriptor {
            id: LOGIN_KEEP_SESSION,
            description: "Log into a site and keep the authenticated session alive for \
                          later runs. Requires local trust.",
            input_schema: login::input_schema(),
            needs_session: true,
            session_preserving: true,
            requires_local_trust: true,
        },
        TemplateDescriptor {
            id: MULTI_TAB_COMPARE,
            description: "Snapshot 2-10 URLs and diff the named fields (title, \
                          headings, canonical URL by default).",
            input_schema: compare::input_schema(),
            needs_session: false,
            session_preserving: false,
            requires_local_trust: false,
        },
    ]
}

pub fn descriptor(template_id: &str) -> Option<TemplateDescriptor> {
    descriptors().into_iter().find(|d| d.id == template_id)
}

/// Validate inputs and return the run's unit count (totalSteps).
/// Failures name the offending field and consume no run id.
pub fn validate(template_id: &str, inputs: &Value) -> Result<u32, RunError> {
    match template_id {
        BATCH_EXTRACT_PAGES => batch::validate(inputs),
        LOGIN_KEEP_SESSION => login::validate(inputs),
        MULTI_TAB_COMPARE => compare::validate(inputs),
        other => Err(RunError::new(
            ErrorCode::TemplateNotFound,
            format!("unknown template: {other}"),
        )),
    }
}

/// Execution context handed to a template by the task service.
pub struct TemplateCtx {
    pub registry: Arc<ToolRegistry>,
    /// The run's browser session (when the template needs one).
    pub session_id: Option<String>,
    pub cancel: CancelToken,
    pub progress: ProgressHandle,
    pub events: Option<broadcast::Sender<TaskEvent>>,
}

impl TemplateCtx {
    pub(crate) fn emit(&self, event: TaskEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

pub async fn execute(template_id: &str, inputs: &Value, ctx: &TemplateCtx) -> Result<Value, RunError> {
    match template_id {
        BATCH_EXTRACT_PAGES => batch::execute(inputs, ctx).await,
        LOGIN_KEEP_SESSION => login::execute(inputs, ctx).await,
        MULTI_TAB_COMPARE => compare::execute(inputs, ctx).await,
        other => Err(RunError::new(
            ErrorCode::TemplateNotFound,
            format!("unknown template: {other}"),
        )),
    }
}

/// One tool-surface call on behalf of a template.  Error envelopes come
/// back as `RunError`s so templates can branch on the taxonomy.
pub(crate) async fn surface_call(
    ctx: &TemplateCtx,
    name: &str,
    args: Value,
) -> Result<Value, RunError> {
    ctx.cancel.check()?;
    ctx.emit(TaskEvent::ToolCall {
        name: name.to_string(),
    });
    let call = ToolCall::new(format!("tpl_{}", Uuid::new_v4()), name, args);
    let output = ctx.registry.execute(&call).await;
    ctx.emit(TaskEvent::ToolResult {
        name: name.to_string(),
        is_error: output.is_error,
    });
    if output.is_error {
        let code = output
            .error_code()
            .and_then(ErrorCode::parse)
            .unwrap_or(ErrorCode::ExecutionError);
        let message = output.value["error"]
            .as_str()
            .unwrap_or("tool call failed")
            .to_string();
        return Err(RunError::new(code, message));
    }
    Ok(output.value)
}

/// Required-string lookup shared by the template validators.
pub(crate) fn require_str<'a>(inputs: &'a Value, field: &str) -> Result<&'a str, RunError> {
    inputs
        .pointer(&format!("/{}", field.replace('.', "/")))
        .and_then(Value::as_str)
        .ok_or_else(|| RunError::invalid_parameter(field, "expected string"))
}

pub(crate) fn url_list(inputs: &Value, min: usize, max: usize) -> Result<Vec<String>, RunError> {
    let urls = inputs
        .get("urls")
        .and_then(Value::as_array)
        .ok_or_else(|| RunError::invalid_parameter("urls", "expected array of strings"))?;
    if urls.len() < min || urls.len() > max {
        return Err(RunError::invalid_parameter(
            "urls",
            format!("expected {min}..{max} entries, got {}", urls.len()),
        ));
    }
    urls.iter()
        .map(|u| {
            u.as_str()
                .map(String::from)
                .ok_or_else(|| RunError::invalid_parameter("urls", "entries must be strings"))
        })
        .collect()
}
