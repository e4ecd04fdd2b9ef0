// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Task ops: the tool-surface cluster wrapping the run manager, artifact
//! store, and template executor so agents and protocol clients drive the
//! same control plane.

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};

use rudder_runs::{
    ArtifactKind, ErrorCode, ListFilter, RunError, RunStatus, SubmitMode, SubmitOutcome,
};
use rudder_tools::{Tool, ToolCall, ToolRegistry};

use crate::service::TaskService;
use crate::templates;

/// Register the seven task ops against the shared registry.
pub fn register_task_tools(registry: &mut ToolRegistry, service: TaskService) {
    registry.register(ListTaskTemplatesTool);
    registry.register(RunTaskTemplateTool {
        service: service.clone(),
    });
    registry.register(GetTaskRunTool {
        service: service.clone(),
    });
    registry.register(ListTaskRunsTool {
        service: service.clone(),
    });
    registry.register(CancelTaskRunTool {
        service: service.clone(),
    });
    registry.register(GetArtifactTool {
        service: service.clone(),
    });
    registry.register(GetRuntimeProfileTool { service });
}

fn arg_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, RunError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| RunError::invalid_parameter(key, "expected string"))
}

fn parse_mode(args: &Value) -> Result<SubmitMode, RunError> {
    match args.get("mode").and_then(Value::as_str) {
        None | Some("auto") => Ok(SubmitMode::Auto),
        Some("sync") => Ok(SubmitMode::Sync),
        Some("async") => Ok(SubmitMode::Async),
        Some(other) => Err(RunError::invalid_parameter(
            "mode",
            format!("expected sync|async|auto, got {other}"),
        )),
    }
}

fn parse_status(s: &str) -> Result<RunStatus, RunError> {
    match s {
        "queued" => Ok(RunStatus::Queued),
        "running" => Ok(RunStatus::Running),
        "succeeded" => Ok(RunStatus::Succeeded),
        "partial_success" => Ok(RunStatus::PartialSuccess),
        "failed" => Ok(RunStatus::Failed),
        "canceled" => Ok(RunStatus::Canceled),
        other => Err(RunError::invalid_parameter(
            "status",
            format!("unknown status {other}"),
        )),
    }
}

pub struct ListTaskTemplatesTool;

#[async_trait]
impl Tool for ListTaskTemplatesTool {
    fn name(&self) -> &str {
        "list_task_templates"
    }

    fn description(&self) -> &str {
        "List the closed set of task templates with their input schemas, \
         trust requirements, and session behaviour."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "additionalProperties": false })
    }

    async fn execute(&self, _call: &ToolCall) -> Result<Value, RunError> {
        let templates: Vec<Value> = templates::descriptors()
            .into_iter()
            .map(|d| {
                json!({
                    "id": d.id,
                    "description": d.description,
                    "inputSchema": d.input_schema,
                    "requiresLocalTrust": d.requires_local_trust,
                    "sessionPreserving": d.session_preserving,
                })
            })
            .collect();
        Ok(json!({ "templates": templates }))
    }
}

pub struct RunTaskTemplateTool {
    service: TaskService,
}

#[async_trait]
impl Tool for RunTaskTemplateTool {
    fn name(&self) -> &str {
        "run_task_template"
    }

    fn description(&self) -> &str {
        "Run one task template. mode=sync waits for the terminal run; \
         async returns a runId to poll with get_task_run; auto picks sync \
         for light workloads (≤10 units)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "templateId": { "type": "string" },
                "inputs": { "type": "object" },
                "mode": { "type": "string", "description": "sync | async | auto" },
            },
            "required": ["templateId"],
        })
    }

    fn char_budget(&self) -> usize {
        10_000
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let template_id = arg_str(&call.args, "templateId")?;
        let inputs = call.args.get("inputs").cloned().unwrap_or(json!({}));
        let mode = parse_mode(&call.args)?;
        match self
            .service
            .run_template(template_id, inputs, mode, None)
            .await?
        {
            SubmitOutcome::Completed(run) => {
                Ok(serde_json::to_value(run).unwrap_or(Value::Null))
            }
            SubmitOutcome::Accepted { run_id } => Ok(json!({
                "runId": run_id,
                "status": "queued",
            })),
        }
    }
}

pub struct GetTaskRunTool {
    service: TaskService,
}

#[async_trait]
impl Tool for GetTaskRunTool {
    fn name(&self) -> &str {
        "get_task_run"
    }

    fn description(&self) -> &str {
        "Current state of one run: status, progress, result, error, and \
         artifacts. Polling this tool never consumes the agent's tool-call \
         budget."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "runId": { "type": "string" } },
            "required": ["runId"],
        })
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let run_id = arg_str(&call.args, "runId")?;
        let run = self
            .service
            .runs()
            .get(run_id)
            .ok_or_else(|| RunError::new(ErrorCode::RunNotFound, format!("no run {run_id}")))?;
        Ok(serde_json::to_value(run).unwrap_or(Value::Null))
    }
}

pub struct ListTaskRunsTool {
    service: TaskService,
}

#[async_trait]
impl Tool for ListTaskRunsTool {
    fn name(&self) -> &str {
        "list_task_runs"
    }

    fn description(&self) -> &str {
        "List runs, newest first, with optional status/template/session \
         filters. `total` counts the filtered set before pagination."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": { "type": "string" },
                "templateId": { "type": "string" },
                "sessionId": { "type": "string" },
                "limit": { "type": "integer" },
                "offset": { "type": "integer" },
            },
        })
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let status = call
            .args
            .get("status")
            .and_then(Value::as_str)
            .map(parse_status)
            .transpose()?;
        let filter = ListFilter {
            status,
            template_id: call
                .args
                .get("templateId")
                .and_then(Value::as_str)
                .map(String::from),
            session_id: call
                .args
                .get("sessionId")
                .and_then(Value::as_str)
                .map(String::from),
            limit: call.args.get("limit").and_then(Value::as_u64).map(|v| v as usize),
            offset: call
                .args
                .get("offset")
                .and_then(Value::as_u64)
                .map(|v| v as usize),
        };
        let listed = self.service.runs().list(&filter);
        Ok(json!({
            "total": listed.total,
            "runs": listed.runs,
        }))
    }
}

pub struct CancelTaskRunTool {
    service: TaskService,
}

#[async_trait]
impl Tool for CancelTaskRunTool {
    fn name(&self) -> &str {
        "cancel_task_run"
    }

    fn description(&self) -> &str {
        "Cooperatively cancel a run. Returns canceled=false for unknown or \
         already-terminal runs."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "runId": { "type": "string" } },
            "required": ["runId"],
        })
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let run_id = arg_str(&call.args, "runId")?;
        Ok(json!({ "canceled": self.service.runs().cancel(run_id) }))
    }
}

pub struct GetArtifactTool {
    service: TaskService,
}

#[async_trait]
impl Tool for GetArtifactTool {
    fn name(&self) -> &str {
        "get_artifact"
    }

    fn description(&self) -> &str {
        "Fetch an artifact by id. Text and JSON artifacts return their \
         content inline; binary artifacts return base64."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "artifactId": { "type": "string" } },
            "required": ["artifactId"],
        })
    }

    fn char_budget(&self) -> usize {
        16_000
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let id = arg_str(&call.args, "artifactId")?;
        let artifact = self.service.artifacts().get(id).ok_or_else(|| {
            RunError::invalid_parameter("artifactId", "unknown or expired artifact")
        })?;
        let mut out = json!({
            "id": artifact.id,
            "kind": artifact.kind,
            "size": artifact.bytes.len(),
            "createdAt": artifact.created_at,
        });
        match artifact.kind {
            ArtifactKind::Binary => {
                out["contentBase64"] =
                    json!(base64::engine::general_purpose::STANDARD.encode(&artifact.bytes));
            }
            ArtifactKind::Text | ArtifactKind::Json => {
                out["content"] = json!(String::from_utf8_lossy(&artifact.bytes));
            }
        }
        Ok(out)
    }
}

pub struct GetRuntimeProfileTool {
    service: TaskService,
}

#[async_trait]
impl Tool for GetRuntimeProfileTool {
    fn name(&self) -> &str {
        "get_runtime_profile"
    }

    fn description(&self) -> &str {
        "Concurrency limits, trust level, and supported submit modes of \
         this orchestrator."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "additionalProperties": false })
    }

    async fn execute(&self, _call: &ToolCall) -> Result<Value, RunError> {
        Ok(self.service.runtime_profile())
    }
}
