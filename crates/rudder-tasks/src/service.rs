// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use rudder_browser::BrowserDriver;
use rudder_config::{Config, TrustLevel};
use rudder_core::{AgentEvent, AgentGoal, AgentLoop};
use rudder_knowledge::{
    compose_fragment, KnowledgeCard, KnowledgeStore, PatternKind, PatternSource, SitePattern,
};
use rudder_model::ChatModel;
use rudder_runs::{
    ArtifactStore, ErrorCode, Run, RunError, RunExecutor, RunManager, RunStatus, SubmitMode,
    SubmitOptions, SubmitOutcome, SubmitRequest, TerminalHook,
};
use rudder_tools::{Enricher, ToolRegistry};

use crate::events::TaskEvent;
use crate::planner::Planner;
use crate::spec::{Constraints, PlanStep, TaskBudget, TaskSpec};
use crate::templates::{self, TemplateCtx};
use crate::verifier::{repair_hints, verify, Verification};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Per-task state surfaced through the REST API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub task_id: String,
    pub trace_id: String,
    /// "running" until terminal; then the terminal run status string.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
    pub last_event: String,
    pub repair_attempts: u32,
}

struct ServiceInner {
    config: Config,
    driver: Arc<dyn BrowserDriver>,
    runs: RunManager,
    artifacts: Arc<ArtifactStore>,
    knowledge: KnowledgeStore,
    model: Arc<dyn ChatModel>,
    planner: Planner,
    enricher: Arc<Enricher>,
    registry: OnceLock<Arc<ToolRegistry>>,
    tasks: Mutex<HashMap<String, TaskRecord>>,
    channels: Mutex<HashMap<String, broadcast::Sender<TaskEvent>>>,
    /// Sessions created through the REST session CRUD.
    rest_sessions: Mutex<Vec<String>>,
}

/// The control-plane facade: plans tasks, drives template and agent runs
/// through the run manager, verifies results, and orchestrates repair.
#[derive(Clone)]
pub struct TaskService {
    inner: Arc<ServiceInner>,
}

impl TaskService {
    pub fn new(
        config: Config,
        driver: Arc<dyn BrowserDriver>,
        runs: RunManager,
        artifacts: Arc<ArtifactStore>,
        knowledge: KnowledgeStore,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        let planner = if config.planner.llm_fallback {
            Planner::with_llm_fallback(model.clone())
        } else {
            Planner::new()
        };
        let enricher = Arc::new(Enricher::new(&config.enrichment));
        Self {
            inner: Arc::new(ServiceInner {
                config,
                driver,
                runs,
                artifacts,
                knowledge,
                model,
                planner,
                enricher,
                registry: OnceLock::new(),
                tasks: Mutex::new(HashMap::new()),
                channels: Mutex::new(HashMap::new()),
                rest_sessions: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Wire the full tool registry (browser + task ops).  Must be called
    /// once during assembly, after the task tools were registered.
    pub fn set_registry(&self, registry: Arc<ToolRegistry>) {
        let _ = self.inner.registry.set(registry);
    }

    fn registry(&self) -> Result<Arc<ToolRegistry>, RunError> {
        self.inner
            .registry
            .get()
            .cloned()
            .ok_or_else(|| RunError::internal("tool registry not wired"))
    }

    pub fn runs(&self) -> &RunManager {
        &self.inner.runs
    }

    pub fn artifacts(&self) -> &Arc<ArtifactStore> {
        &self.inner.artifacts
    }

    pub fn knowledge(&self) -> &KnowledgeStore {
        &self.inner.knowledge
    }

    pub fn runtime_profile(&self) -> Value {
        json!({
            "maxConcurrentRuns": self.inner.config.runs.max_concurrent_runs,
            "trustLevel": self.inner.config.trust_level.to_string(),
            "supportedModes": ["sync", "async", "auto"],
        })
    }

    // ── Template runs ─────────────────────────────────────────────────────

    /// Validate and schedule one template run.  Validation failures never
    /// consume a run id.
    pub async fn run_template(
        &self,
        template_id: &str,
        inputs: Value,
        mode: SubmitMode,
        events: Option<broadcast::Sender<TaskEvent>>,
    ) -> Result<SubmitOutcome, RunError> {
        let descriptor = templates::descriptor(template_id).ok_or_else(|| {
            RunError::new(
                ErrorCode::TemplateNotFound,
                format!("unknown template: {template_id}"),
            )
        })?;
        if descriptor.requires_local_trust && self.inner.config.trust_level != TrustLevel::Local {
            return Err(RunError::new(
                ErrorCode::TrustLevelNotAllowed,
                format!("template {template_id} requires trust_level=local"),
            ));
        }
        let total_steps = templates::validate(template_id, &inputs)?;

        let caller_session = inputs
            .get("sessionId")
            .and_then(Value::as_str)
            .map(String::from);
        let owns_session = descriptor.needs_session && caller_session.is_none();
        let session_id = if owns_session {
            Some(
                self.inner
                    .driver
                    .create_session()
                    .await
                    .map_err(|e| RunError::new(ErrorCode::InternalError, e.to_string()))?,
            )
        } else {
            caller_session
        };

        let registry = self.registry()?;
        let template = template_id.to_string();
        let run_inputs = inputs.clone();
        let run_events = events.clone();
        let exec_session = session_id.clone();
        let executor: RunExecutor = Box::new(move |ctx| {
            Box::pin(async move {
                let tctx = TemplateCtx {
                    registry,
                    session_id: exec_session,
                    cancel: ctx.cancel,
                    progress: ctx.progress,
                    events: run_events,
                };
                templates::execute(&template, &run_inputs, &tctx).await
            })
        });

        let hook = self.session_reaper(descriptor.session_preserving);
        let created_session = owns_session.then(|| session_id.clone()).flatten();
        let outcome = self
            .inner
            .runs
            .submit(
                SubmitRequest {
                    template_id: template_id.to_string(),
                    session_id,
                    owns_session,
                    total_steps,
                },
                executor,
                SubmitOptions {
                    mode,
                    timeout_ms: inputs.get("timeoutMs").and_then(Value::as_u64),
                    on_terminal: Some(hook),
                },
            )
            .await;
        if outcome.is_err() {
            // A rejected submission never runs the terminal hook, so the
            // session created for it must be reaped here.
            if let Some(session) = created_session {
                let _ = self.inner.driver.close_session(&session).await;
            }
        }
        outcome
    }

    // ── Agent-goal runs ───────────────────────────────────────────────────

    pub async fn run_agent_goal(
        &self,
        goal: &str,
        hints: Vec<String>,
        constraints: Constraints,
        budget: TaskBudget,
        mode: SubmitMode,
        events: Option<broadcast::Sender<TaskEvent>>,
    ) -> Result<SubmitOutcome, RunError> {
        let registry = self.registry()?;
        let session_id = self
            .inner
            .driver
            .create_session()
            .await
            .map_err(|e| RunError::new(ErrorCode::InternalError, e.to_string()))?;

        let domain = domain_of(goal, &hints);
        let knowledge_fragment = domain.as_deref().and_then(|d| {
            let card = self.inner.knowledge.load_card(d).ok().flatten()?;
            Some(compose_fragment(
                &card,
                Some(goal),
                &self.inner.config.knowledge,
                chrono::Utc::now(),
            ))
        });

        let agent = AgentLoop::new(
            self.inner.model.clone(),
            registry,
            self.inner.enricher.clone(),
            self.inner.config.agent.clone(),
            self.inner.config.conversation.clone(),
        );
        let agent_goal = AgentGoal {
            goal: goal.to_string(),
            hints,
            knowledge_fragment,
            session_id: Some(session_id.clone()),
            max_tool_calls: budget.max_tool_calls,
            max_duration_ms: constraints.max_duration_ms,
        };
        let knowledge = self.inner.knowledge.clone();
        let runs = self.inner.runs.clone();
        let goal_text = goal.to_string();
        let run_events = events.clone();
        let executor: RunExecutor = Box::new(move |ctx| {
            Box::pin(async move {
                let (agent_tx, agent_rx) = mpsc::unbounded_channel();
                let forwarder = tokio::spawn(forward_agent_events(
                    agent_rx,
                    run_events,
                    runs,
                    ctx.run_id.clone(),
                ));

                let outcome = agent
                    .run(agent_goal, ctx.cancel, ctx.progress, Some(agent_tx))
                    .await;
                let _ = forwarder.await;
                let outcome = outcome?;

                if outcome.success {
                    if let Some(d) = &domain {
                        absorb_success(&knowledge, d, &goal_text, &outcome.summary);
                    }
                }
                Ok(json!({
                    "success": outcome.success,
                    "result": outcome.result,
                    "summary": outcome.summary,
                    "iterations": outcome.iterations,
                    "toolCalls": outcome.tool_calls,
                }))
            })
        });

        let hook = self.session_reaper(false);
        let created_session = session_id.clone();
        let outcome = self
            .inner
            .runs
            .submit(
                SubmitRequest {
                    template_id: "agent_goal".to_string(),
                    session_id: Some(session_id),
                    owns_session: true,
                    total_steps: self.inner.config.agent.max_iterations,
                },
                executor,
                SubmitOptions {
                    mode,
                    timeout_ms: constraints.max_duration_ms,
                    on_terminal: Some(hook),
                },
            )
            .await;
        if outcome.is_err() {
            let _ = self.inner.driver.close_session(&created_session).await;
        }
        outcome
    }

    /// Terminal hook that reaps owned sessions.  Session-preserving
    /// templates keep the session alive so the caller can reuse or retry.
    fn session_reaper(&self, session_preserving: bool) -> TerminalHook {
        let driver = self.inner.driver.clone();
        Box::new(move |run: Run| {
            Box::pin(async move {
                if !run.owns_session || session_preserving {
                    return;
                }
                if let Some(session) = &run.session_id {
                    if let Err(e) = driver.close_session(session).await {
                        warn!(session = %session, "session reap failed: {e}");
                    }
                }
            })
        })
    }

    // ── Tasks (plan → execute → verify → repair) ──────────────────────────

    /// Create a task: plan it, record it, and spawn the orchestration.
    /// Returns the initial record; progress flows through the event stream.
    pub async fn submit_task(&self, spec: TaskSpec) -> Result<TaskRecord, RunError> {
        let task_id = format!("task_{}", Uuid::new_v4());
        let trace_id = format!("trace_{}", Uuid::new_v4());

        let plan = if self.inner.config.planner.llm_fallback {
            self.inner.planner.plan_with_fallback(&spec).await
        } else {
            self.inner.planner.plan(&spec)
        };

        // Template inputs are validated before anything is recorded, so a
        // bad spec costs neither a task nor a run id.
        if let PlanStep::Template {
            template_id,
            inputs,
            ..
        } = &plan.step
        {
            templates::validate(template_id, inputs)?;
        }

        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        self.inner
            .channels
            .lock()
            .unwrap()
            .insert(task_id.clone(), tx.clone());

        let record = TaskRecord {
            task_id: task_id.clone(),
            trace_id: trace_id.clone(),
            status: "running".to_string(),
            run_id: None,
            result: None,
            verification: None,
            error: None,
            last_event: "plan_created".to_string(),
            repair_attempts: 0,
        };
        self.inner
            .tasks
            .lock()
            .unwrap()
            .insert(task_id.clone(), record.clone());

        let _ = tx.send(TaskEvent::PlanCreated {
            source: format!("{:?}", plan.source).to_lowercase(),
            step: serde_json::to_value(&plan.step).unwrap_or(Value::Null),
        });

        let service = self.clone();
        tokio::spawn(async move {
            service.execute_plan(task_id, trace_id, spec, plan.step, tx).await;
        });
        Ok(record)
    }

    async fn execute_plan(
        &self,
        task_id: String,
        trace_id: String,
        spec: TaskSpec,
        step: PlanStep,
        tx: broadcast::Sender<TaskEvent>,
    ) {
        let mut attempt: u32 = 0;
        let mut current = step;
        let mut merged_result: Option<Value> = None;
        let mut tool_calls_used: u32 = 0;

        let (final_success, final_status) = loop {
            let _ = tx.send(TaskEvent::StepStarted {
                step_id: current.step_id().to_string(),
            });
            self.update_record(&task_id, |r| r.last_event = "step_started".into());

            let remaining_budget = TaskBudget {
                max_retries: spec.budget.max_retries,
                max_tool_calls: spec
                    .budget
                    .max_tool_calls
                    .map(|m| m.saturating_sub(tool_calls_used)),
            };
            let outcome = match &current {
                PlanStep::Template {
                    template_id,
                    inputs,
                    ..
                } => {
                    self.run_template(
                        template_id,
                        inputs.clone(),
                        SubmitMode::Sync,
                        Some(tx.clone()),
                    )
                    .await
                }
                PlanStep::AgentGoal { goal, hints, .. } => {
                    self.run_agent_goal(
                        goal,
                        hints.clone(),
                        spec.constraints,
                        remaining_budget,
                        SubmitMode::Sync,
                        Some(tx.clone()),
                    )
                    .await
                }
            };

            let run = match outcome {
                Ok(SubmitOutcome::Completed(run)) => run,
                Ok(SubmitOutcome::Accepted { .. }) => {
                    unreachable!("sync submit returns a completed run")
                }
                Err(e) => {
                    self.update_record(&task_id, |r| r.error = Some(e.clone()));
                    break (false, "failed".to_string());
                }
            };

            tool_calls_used += run
                .result
                .as_ref()
                .and_then(|v| v.get("toolCalls"))
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32;

            let run_result = run.result.clone().unwrap_or(Value::Null);
            let combined = match merged_result.take() {
                Some(prev) => merge_results(prev, run_result),
                None => run_result,
            };
            merged_result = Some(combined.clone());

            self.update_record(&task_id, |r| {
                r.run_id = Some(run.id.clone());
                r.result = Some(combined.clone());
                r.error = run.error.clone();
            });

            if !matches!(run.status, RunStatus::Succeeded | RunStatus::PartialSuccess) {
                break (false, run.status.to_string());
            }

            let Some(schema) = &spec.output_schema else {
                break (true, run.status.to_string());
            };
            let verification = verify(&combined, schema);
            let _ = tx.send(TaskEvent::VerificationResult {
                pass: verification.pass,
                missing_fields: verification.missing_fields.clone(),
            });
            self.update_record(&task_id, |r| {
                r.verification = Some(verification.clone());
                r.last_event = "verification_result".into();
            });

            if verification.pass {
                break (true, run.status.to_string());
            }
            // Any verification failure consumes a repair attempt,
            // regardless of the run's partial/full success grade.
            if attempt >= spec.budget.max_retries {
                break (false, "failed".to_string());
            }
            if let Some(limit) = spec.budget.max_tool_calls {
                if tool_calls_used >= limit {
                    self.update_record(&task_id, |r| {
                        r.error = Some(RunError::new(
                            ErrorCode::ExecutionError,
                            format!("maxToolCalls ({limit}) exhausted across attempts"),
                        ));
                    });
                    break (false, "failed".to_string());
                }
            }
            attempt += 1;
            let _ = tx.send(TaskEvent::RepairAttempted { attempt });
            self.update_record(&task_id, |r| {
                r.repair_attempts = attempt;
                r.last_event = "repair_attempted".into();
            });
            current = repair_step(&spec, &verification, attempt);
        };

        debug!(task = %task_id, success = final_success, "task terminal");
        self.update_record(&task_id, |r| {
            r.status = final_status.clone();
            r.last_event = "done".into();
        });
        let _ = tx.send(TaskEvent::Done {
            success: final_success,
            trace_id,
        });
    }

    fn update_record(&self, task_id: &str, f: impl FnOnce(&mut TaskRecord)) {
        let mut tasks = self.inner.tasks.lock().unwrap();
        if let Some(record) = tasks.get_mut(task_id) {
            f(record);
        }
    }

    pub fn get_task(&self, task_id: &str) -> Option<TaskRecord> {
        self.inner.tasks.lock().unwrap().get(task_id).cloned()
    }

    pub fn subscribe(&self, task_id: &str) -> Option<broadcast::Receiver<TaskEvent>> {
        self.inner
            .channels
            .lock()
            .unwrap()
            .get(task_id)
            .map(|tx| tx.subscribe())
    }

    // ── REST session CRUD ─────────────────────────────────────────────────

    pub async fn create_browser_session(&self) -> Result<String, RunError> {
        let id = self
            .inner
            .driver
            .create_session()
            .await
            .map_err(|e| RunError::new(ErrorCode::InternalError, e.to_string()))?;
        self.inner.rest_sessions.lock().unwrap().push(id.clone());
        Ok(id)
    }

    pub fn list_browser_sessions(&self) -> Vec<String> {
        self.inner.rest_sessions.lock().unwrap().clone()
    }

    pub async fn close_browser_session(&self, session: &str) -> Result<(), RunError> {
        self.inner
            .driver
            .close_session(session)
            .await
            .map_err(|e| RunError::new(ErrorCode::SessionNotFound, e.to_string()))?;
        self.inner
            .rest_sessions
            .lock()
            .unwrap()
            .retain(|s| s != session);
        Ok(())
    }

    /// Drain in-flight runs and flush durable state.
    pub async fn dispose(&self) {
        self.inner.runs.dispose().await;
        self.inner.knowledge.dispose();
    }
}

/// Shallow-merge two run results; the newer result wins per key.  Used to
/// fold repair-run output over the original result before re-verifying.
fn merge_results(base: Value, newer: Value) -> Value {
    match (base, newer) {
        (Value::Object(mut base), Value::Object(newer)) => {
            for (k, v) in newer {
                match (base.get_mut(&k), v) {
                    (Some(Value::Object(old)), Value::Object(new)) => {
                        for (nk, nv) in new {
                            old.insert(nk, nv);
                        }
                    }
                    (_, v) => {
                        base.insert(k, v);
                    }
                }
            }
            Value::Object(base)
        }
        (_, newer) => newer,
    }
}

/// Build the repair step: an agent goal aimed at the named gaps.
fn repair_step(spec: &TaskSpec, verification: &Verification, attempt: u32) -> PlanStep {
    let hints = repair_hints(verification);
    let missing = verification.missing_fields.join(", ");
    PlanStep::AgentGoal {
        step_id: format!("repair_{attempt}_{}", Uuid::new_v4()),
        goal: format!(
            "The previous attempt at this task left gaps. Original goal: {}. \
             Produce the missing output fields: {missing}.",
            spec.goal
        ),
        hints,
    }
}

/// Extract the working domain from the goal text or hint URLs.
fn domain_of(goal: &str, hints: &[String]) -> Option<String> {
    let mut candidates = vec![goal.to_string()];
    candidates.extend(hints.iter().cloned());
    for text in candidates {
        for token in text.split_whitespace() {
            if token.starts_with("http://") || token.starts_with("https://") {
                if let Ok(url) = url::Url::parse(token.trim_end_matches(['.', ',', ')'])) {
                    if let Some(host) = url.host_str() {
                        return Some(host.to_lowercase());
                    }
                }
            }
        }
    }
    None
}

/// Record a successful agent run as a task-intent pattern on the domain's
/// card.
fn absorb_success(knowledge: &KnowledgeStore, domain: &str, goal: &str, summary: &str) {
    let mut card = match knowledge.load_card(domain) {
        Ok(Some(card)) => card,
        Ok(None) => KnowledgeCard::new(domain),
        Err(e) => {
            warn!(domain, "knowledge load failed, skipping absorption: {e}");
            return;
        }
    };
    let mut description = summary.trim().to_string();
    if description.len() > 160 {
        let mut cut = 160;
        while cut > 0 && !description.is_char_boundary(cut) {
            cut -= 1;
        }
        description.truncate(cut);
    }
    if description.is_empty() {
        description = "completed goal".to_string();
    }
    // One pattern per goal text; repeat successes refresh the existing one.
    if let Some(existing) = card
        .patterns
        .iter_mut()
        .find(|p| p.kind == PatternKind::TaskIntent && p.value == goal)
    {
        existing.record_use(chrono::Utc::now());
    } else {
        card.patterns.push(SitePattern::new(
            PatternKind::TaskIntent,
            description,
            goal,
            0.6,
            PatternSource::AgentAuto,
        ));
    }
    if let Err(e) = knowledge.save_card(card) {
        warn!(domain, "knowledge absorption failed: {e}");
    }
}

/// Drain agent events for one run: attach produced artifacts to the run
/// record and mirror tool activity onto the task's event stream.
async fn forward_agent_events(
    mut rx: mpsc::UnboundedReceiver<AgentEvent>,
    tx: Option<broadcast::Sender<TaskEvent>>,
    runs: RunManager,
    run_id: String,
) {
    while let Some(event) = rx.recv().await {
        let mapped = match event {
            AgentEvent::ArtifactProduced { artifact_id } => {
                if let Err(e) = runs.attach_artifact(&run_id, &artifact_id) {
                    debug!(run = %run_id, "artifact attach skipped: {e}");
                }
                None
            }
            AgentEvent::ToolCallStarted { name, .. } => Some(TaskEvent::ToolCall { name }),
            AgentEvent::ToolCallFinished { name, is_error, .. } => {
                Some(TaskEvent::ToolResult { name, is_error })
            }
            _ => None,
        };
        if let (Some(e), Some(tx)) = (mapped, &tx) {
            let _ = tx.send(e);
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
