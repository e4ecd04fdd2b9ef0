// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use rudder_config::{AgentConfig, ConversationConfig};
use rudder_model::{ChatModel, ChatRequest, Message, ToolSchema};
use rudder_runs::{CancelToken, ErrorCode, ProgressHandle, RunError};
use rudder_tools::{format_within_budget, Enricher, ToolCall, ToolRegistry};

use crate::conversation::ConversationManager;
use crate::events::AgentEvent;
use crate::progress::{phase_for, progress_percent};
use crate::recovery::{decide, RecoveryAction, RecoveryContext};
use crate::tracker::ToolUsageTracker;

/// Reserved terminal tool: the model calls `done` to finish the goal.
const DONE_TOOL: &str = "done";

/// Tool whose calls never consume the tool-call budget, so waiting on a
/// template run cannot exhaust it.
const POLL_TOOL: &str = "get_task_run";

const MAX_EMPTY_TURNS: u32 = 2;

/// A free-form goal for the reason-act loop.
#[derive(Debug, Clone, Default)]
pub struct AgentGoal {
    pub goal: String,
    pub hints: Vec<String>,
    /// Compact per-domain knowledge fragment injected into the system
    /// prompt, composed by the knowledge store.
    pub knowledge_fragment: Option<String>,
    /// Browser session the agent should work in, when one already exists.
    pub session_id: Option<String>,
    pub max_tool_calls: Option<u32>,
    pub max_duration_ms: Option<u64>,
}

/// Terminal report of one agent run.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub success: bool,
    pub result: Value,
    pub summary: String,
    pub iterations: u32,
    pub tool_calls: u32,
}

/// The iterative reason-act loop: prompt → model → tool calls →
/// observation → repeat, with compression, loop detection, budget bounds,
/// and the recovery policy applied per step.
pub struct AgentLoop {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
    enricher: Arc<Enricher>,
    agent_cfg: AgentConfig,
    conv_cfg: ConversationConfig,
}

impl AgentLoop {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: Arc<ToolRegistry>,
        enricher: Arc<Enricher>,
        agent_cfg: AgentConfig,
        conv_cfg: ConversationConfig,
    ) -> Self {
        Self {
            model,
            tools,
            enricher,
            agent_cfg,
            conv_cfg,
        }
    }

    pub async fn run(
        &self,
        goal: AgentGoal,
        cancel: CancelToken,
        progress: ProgressHandle,
        events: Option<mpsc::UnboundedSender<AgentEvent>>,
    ) -> Result<AgentOutcome, RunError> {
        let started = Instant::now();
        let max_iterations = self.agent_cfg.max_iterations;

        let mut conversation = ConversationManager::new(
            &self.system_prompt(&goal),
            Vec::new(),
            self.conv_cfg.clone(),
        );
        conversation.push(Message::user(self.kickoff(&goal)));

        let mut tracker = ToolUsageTracker::new();
        let mut tool_calls_used: u32 = 0;
        let mut empty_turns: u32 = 0;
        let mut model_error_streak: u32 = 0;

        let mut iteration: u32 = 0;
        loop {
            iteration += 1;
            cancel.check()?;

            if iteration > max_iterations {
                return Err(RunError::new(
                    ErrorCode::ExecutionError,
                    format!("maxIterations ({max_iterations}) exhausted before the goal completed"),
                ));
            }
            if let Some(limit) = goal.max_duration_ms {
                if started.elapsed() >= Duration::from_millis(limit) {
                    return Err(RunError::new(
                        ErrorCode::RunTimeout,
                        format!("maxDurationMs ({limit}) exceeded after {iteration} iterations"),
                    ));
                }
            }

            // Progress estimate from tool history.
            let phase = phase_for(tracker.records());
            let percent = progress_percent(phase, iteration, max_iterations);
            progress.set(iteration.saturating_sub(1));
            emit(&events, AgentEvent::Progress { phase, percent });

            let request = ChatRequest {
                messages: conversation.messages().to_vec(),
                tools: self.catalog(),
            };
            let response = match self.model.complete(request).await {
                Ok(r) => {
                    model_error_streak = 0;
                    r
                }
                Err(e) => {
                    model_error_streak += 1;
                    if model_error_streak > self.agent_cfg.max_consecutive_errors {
                        return Err(RunError::internal(format!(
                            "model failed {model_error_streak} times in a row: {e}"
                        )));
                    }
                    let action = decide(&RecoveryContext {
                        error_code: None,
                        error_message: &e.to_string(),
                        tool_name: "model",
                        consecutive_errors: model_error_streak,
                    });
                    if let RecoveryAction::Retry { delay_ms } = action {
                        warn!(attempt = model_error_streak, "model call failed, backing off: {e}");
                        cancel.sleep(Duration::from_millis(delay_ms)).await?;
                    }
                    continue;
                }
            };

            // Terminal `done` wins over anything else in the same turn.
            if let Some(done) = response.tool_calls.iter().find(|c| c.name == DONE_TOOL) {
                let outcome = finish(&done.args, iteration, tool_calls_used);
                emit(&events, AgentEvent::Done { success: outcome.success });
                return Ok(outcome);
            }

            if response.tool_calls.is_empty() {
                if response.text.trim().is_empty() {
                    empty_turns += 1;
                    if empty_turns > MAX_EMPTY_TURNS {
                        return Err(RunError::new(
                            ErrorCode::ExecutionError,
                            "model produced neither text nor tool calls repeatedly",
                        ));
                    }
                    conversation.push(Message::user(
                        "You produced no response or tool call. Continue with your \
                         next action, or finish with the done tool.",
                    ));
                    continue;
                }
                // A plain text answer closes the goal with that answer.
                let outcome = AgentOutcome {
                    success: true,
                    result: json!({ "summary": response.text }),
                    summary: response.text,
                    iterations: iteration,
                    tool_calls: tool_calls_used,
                };
                emit(&events, AgentEvent::Done { success: true });
                return Ok(outcome);
            }
            empty_turns = 0;

            conversation.push(Message::assistant_tool_calls(
                response.text.clone(),
                response.tool_calls.clone(),
            ));

            let mut last_error: Option<(Option<ErrorCode>, String, String)> = None;
            for invocation in &response.tool_calls {
                cancel.check()?;

                // Polling the run store must never exhaust the budget.
                if invocation.name != POLL_TOOL {
                    tool_calls_used += 1;
                    if let Some(limit) = goal.max_tool_calls {
                        if tool_calls_used > limit {
                            return Err(RunError::new(
                                ErrorCode::ExecutionError,
                                format!("maxToolCalls ({limit}) exceeded"),
                            ));
                        }
                    }
                }

                emit(
                    &events,
                    AgentEvent::ToolCallStarted {
                        name: invocation.name.clone(),
                        args: invocation.args.clone(),
                    },
                );

                let call = ToolCall::new(
                    invocation.id.clone(),
                    invocation.name.clone(),
                    invocation.args.clone(),
                );
                let output = self.tools.execute(&call).await;

                tracker.record(
                    &invocation.name,
                    &invocation.args,
                    !output.is_error,
                    output.error_code().map(String::from),
                );
                emit(
                    &events,
                    AgentEvent::ToolCallFinished {
                        name: invocation.name.clone(),
                        is_error: output.is_error,
                        error_code: output.error_code().map(String::from),
                    },
                );

                if output.is_error {
                    last_error = Some((
                        output.error_code().and_then(ErrorCode::parse),
                        output.value["error"].as_str().unwrap_or("tool failed").to_string(),
                        invocation.name.clone(),
                    ));
                } else if let Some(artifact_id) =
                    output.value.get("artifactId").and_then(Value::as_str)
                {
                    emit(
                        &events,
                        AgentEvent::ArtifactProduced {
                            artifact_id: artifact_id.to_string(),
                        },
                    );
                }

                let envelope = self.enricher.enrich(&invocation.name, &invocation.args, &output);
                let budget = self.tools.char_budget(&invocation.name);
                let content = format_within_budget(&envelope, budget);
                conversation.push(Message::tool_result(invocation.id.clone(), content));
            }

            // Loop detectors, first match wins; the hint is injected verbatim.
            if let Some(pattern) = tracker.detect_any() {
                debug!(pattern = pattern.kind(), "usage pattern detected");
                conversation.push(Message::user(pattern.hint()));
                emit(
                    &events,
                    AgentEvent::HintInjected {
                        kind: pattern.kind().to_string(),
                    },
                );
            }

            // Recovery policy for the last error of this batch.
            if let Some((code, message, tool_name)) = last_error {
                let consecutive = tracker.consecutive_errors();
                if consecutive > self.agent_cfg.max_consecutive_errors {
                    return Err(RunError::new(
                        code.unwrap_or(ErrorCode::ExecutionError),
                        format!("{consecutive} consecutive tool errors; last: {message}"),
                    ));
                }
                match decide(&RecoveryContext {
                    error_code: code,
                    error_message: &message,
                    tool_name: &tool_name,
                    consecutive_errors: consecutive,
                }) {
                    RecoveryAction::Retry { delay_ms } => {
                        cancel.sleep(Duration::from_millis(delay_ms)).await?;
                    }
                    RecoveryAction::InjectHint { message } => {
                        conversation.push(Message::user(message));
                        emit(
                            &events,
                            AgentEvent::HintInjected {
                                kind: "recovery".to_string(),
                            },
                        );
                    }
                    RecoveryAction::Abort { reason } => {
                        emit(&events, AgentEvent::Done { success: false });
                        return Err(RunError::new(
                            code.unwrap_or(ErrorCode::ExecutionError),
                            reason,
                        ));
                    }
                }
            }
        }
    }

    fn system_prompt(&self, goal: &AgentGoal) -> String {
        let mut prompt = String::from(
            "You are a browser automation agent. You reach the user's goal by \
             calling the provided tools, one careful step at a time.\n\n\
             Rules:\n\
             - Inspect before you act: get_page_info returns the element ids \
             that click/type_text/set_value address.\n\
             - Element ids go stale after navigation; refresh them.\n\
             - When the goal is reached (or provably unreachable), call the \
             `done` tool with your result. Do not keep observing after that.\n",
        );
        if let Some(session) = &goal.session_id {
            prompt.push_str(&format!("\nWork in the existing browser session `{session}`.\n"));
        }
        if let Some(fragment) = &goal.knowledge_fragment {
            prompt.push_str("\n## Site knowledge from earlier runs\n");
            prompt.push_str(fragment);
            prompt.push('\n');
        }
        prompt
    }

    fn kickoff(&self, goal: &AgentGoal) -> String {
        let mut text = format!("Goal: {}", goal.goal);
        if !goal.hints.is_empty() {
            text.push_str("\n\nHints:\n");
            for hint in &goal.hints {
                text.push_str(&format!("- {hint}\n"));
            }
        }
        text
    }

    /// The tool catalog sent to the model: every registered tool plus the
    /// reserved `done` terminal.
    fn catalog(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .schemas()
            .into_iter()
            .map(|s| ToolSchema {
                name: s.name,
                description: s.description,
                parameters: s.parameters,
            })
            .collect();
        schemas.push(ToolSchema {
            name: DONE_TOOL.to_string(),
            description: "Finish the goal. Call exactly once, when the goal is \
                          complete or cannot be completed."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "success": { "type": "boolean" },
                    "result": { "type": "object", "description": "Structured result data" },
                    "summary": { "type": "string", "description": "One-paragraph outcome report" },
                },
                "required": ["success", "summary"],
            }),
        });
        schemas
    }
}

fn finish(args: &Value, iterations: u32, tool_calls: u32) -> AgentOutcome {
    AgentOutcome {
        success: args.get("success").and_then(Value::as_bool).unwrap_or(true),
        result: args.get("result").cloned().unwrap_or_else(|| json!({})),
        summary: args
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        iterations,
        tool_calls,
    }
}

fn emit(events: &Option<mpsc::UnboundedSender<AgentEvent>>, event: AgentEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rudder_config::{DetailLevel, EnrichmentConfig};
    use rudder_model::{mock::ScriptedModel, ChatResponse, ToolInvocation};
    use rudder_tools::Tool;

    struct ProbeTool {
        name: &'static str,
        fail_code: Option<ErrorCode>,
    }

    #[async_trait]
    impl Tool for ProbeTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "test probe"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn execute(&self, _call: &ToolCall) -> Result<Value, RunError> {
            match self.fail_code {
                Some(code) => Err(RunError::new(code, "probe failure")),
                None => Ok(json!({ "probe": true })),
            }
        }
    }

    struct PollTool;

    #[async_trait]
    impl Tool for PollTool {
        fn name(&self) -> &str {
            "get_task_run"
        }
        fn description(&self) -> &str {
            "poll a run"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn execute(&self, _call: &ToolCall) -> Result<Value, RunError> {
            Ok(json!({ "id": "run_x", "status": "running" }))
        }
    }

    fn loop_with(
        tools: Vec<Box<dyn Fn(&mut ToolRegistry)>>,
        script: Vec<ChatResponse>,
        max_iterations: u32,
    ) -> (AgentLoop, Arc<ScriptedModel>) {
        let mut registry = ToolRegistry::new();
        for add in tools {
            add(&mut registry);
        }
        let model = Arc::new(ScriptedModel::new(script));
        let agent = AgentLoop::new(
            model.clone(),
            Arc::new(registry),
            Arc::new(Enricher::new(&EnrichmentConfig {
                detail_level: DetailLevel::Normal,
                adaptive_policy: true,
            })),
            AgentConfig {
                max_iterations,
                max_consecutive_errors: 3,
            },
            ConversationConfig::default(),
        );
        (agent, model)
    }

    fn call(id: &str, name: &str, args: Value) -> ChatResponse {
        ChatResponse {
            tool_calls: vec![ToolInvocation {
                id: id.into(),
                name: name.into(),
                args,
            }],
            ..ChatResponse::default()
        }
    }

    fn done(success: bool, summary: &str) -> ChatResponse {
        call("d", "done", json!({ "success": success, "summary": summary }))
    }

    fn goal(text: &str) -> AgentGoal {
        AgentGoal {
            goal: text.into(),
            ..AgentGoal::default()
        }
    }

    // ── Termination ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn done_on_first_turn_finishes() {
        let (agent, _) = loop_with(vec![], vec![done(true, "all good")], 20);
        let outcome = agent
            .run(goal("g"), CancelToken::new(), ProgressHandle::noop(), None)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.summary, "all good");
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.tool_calls, 0);
    }

    #[tokio::test]
    async fn text_only_answer_closes_goal() {
        let (agent, _) = loop_with(vec![], vec![ChatResponse::text_only("the title is X")], 20);
        let outcome = agent
            .run(goal("g"), CancelToken::new(), ProgressHandle::noop(), None)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.result["summary"], "the title is X");
    }

    #[tokio::test]
    async fn tool_then_done_records_and_counts() {
        let (agent, model) = loop_with(
            vec![Box::new(|r| {
                r.register(ProbeTool {
                    name: "probe",
                    fail_code: None,
                })
            })],
            vec![call("c1", "probe", json!({})), done(true, "ok")],
            20,
        );
        let outcome = agent
            .run(goal("g"), CancelToken::new(), ProgressHandle::noop(), None)
            .await
            .unwrap();
        assert_eq!(outcome.tool_calls, 1);
        assert_eq!(outcome.iterations, 2);

        // The done-turn request must contain the enriched tool result.
        let last = model.last_request.lock().unwrap();
        let messages = &last.as_ref().unwrap().messages;
        let tool_msg = messages
            .iter()
            .find(|m| m.role == rudder_model::Role::Tool)
            .expect("tool result in history");
        assert!(tool_msg.content.contains("aiSummary"));
    }

    // ── Budgets ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn max_iterations_is_a_terminal_failure() {
        let script: Vec<ChatResponse> = (0..5)
            .map(|i| call(&format!("c{i}"), "probe", json!({"i": i})))
            .collect();
        let (agent, _) = loop_with(
            vec![Box::new(|r| {
                r.register(ProbeTool {
                    name: "probe",
                    fail_code: None,
                })
            })],
            script,
            3,
        );
        let err = agent
            .run(goal("g"), CancelToken::new(), ProgressHandle::noop(), None)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ExecutionError);
        assert!(err.message.contains("maxIterations"));
    }

    #[tokio::test]
    async fn max_tool_calls_is_enforced() {
        let script = vec![
            call("c1", "probe", json!({"n": 1})),
            call("c2", "probe", json!({"n": 2})),
        ];
        let (agent, _) = loop_with(
            vec![Box::new(|r| {
                r.register(ProbeTool {
                    name: "probe",
                    fail_code: None,
                })
            })],
            script,
            20,
        );
        let mut g = goal("g");
        g.max_tool_calls = Some(1);
        let err = agent
            .run(g, CancelToken::new(), ProgressHandle::noop(), None)
            .await
            .unwrap_err();
        assert!(err.message.contains("maxToolCalls"));
    }

    #[tokio::test]
    async fn polling_does_not_consume_tool_budget() {
        let script = vec![
            call("c1", "get_task_run", json!({"runId": "r"})),
            call("c2", "get_task_run", json!({"runId": "r"})),
            done(true, "run finished"),
        ];
        let (agent, _) = loop_with(vec![Box::new(|r| r.register(PollTool))], script, 20);
        let mut g = goal("g");
        g.max_tool_calls = Some(1);
        let outcome = agent
            .run(g, CancelToken::new(), ProgressHandle::noop(), None)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.tool_calls, 0);
    }

    // ── Detectors and recovery ────────────────────────────────────────────

    #[tokio::test]
    async fn futile_retry_hint_is_injected() {
        let args = json!({"elementId": 5});
        let script = vec![
            call("c1", "probe", args.clone()),
            call("c2", "probe", args.clone()),
            done(false, "giving up"),
        ];
        let (agent, model) = loop_with(
            vec![Box::new(|r| {
                r.register(ProbeTool {
                    name: "probe",
                    fail_code: Some(ErrorCode::ElementNotFound),
                })
            })],
            script,
            20,
        );
        let outcome = agent
            .run(goal("g"), CancelToken::new(), ProgressHandle::noop(), None)
            .await
            .unwrap();
        assert!(!outcome.success);

        let last = model.last_request.lock().unwrap();
        let messages = &last.as_ref().unwrap().messages;
        let hint_present = messages.iter().any(|m| {
            m.role == rudder_model::Role::User && m.content.contains("both failed")
        });
        assert!(hint_present, "futile-retry hint must be in the history");
    }

    #[tokio::test]
    async fn page_crash_aborts_the_run() {
        let script = vec![call("c1", "probe", json!({}))];
        let (agent, _) = loop_with(
            vec![Box::new(|r| {
                r.register(ProbeTool {
                    name: "probe",
                    fail_code: Some(ErrorCode::PageCrashed),
                })
            })],
            script,
            20,
        );
        let err = agent
            .run(goal("g"), CancelToken::new(), ProgressHandle::noop(), None)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PageCrashed);
    }

    // ── Cancellation and knowledge ────────────────────────────────────────

    #[tokio::test]
    async fn pre_canceled_token_stops_immediately() {
        let (agent, _) = loop_with(vec![], vec![done(true, "x")], 20);
        let token = CancelToken::new();
        token.cancel(ErrorCode::RunCanceled);
        let err = agent
            .run(goal("g"), token, ProgressHandle::noop(), None)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::RunCanceled);
    }

    #[tokio::test]
    async fn knowledge_fragment_lands_in_system_prompt() {
        let (agent, model) = loop_with(vec![], vec![done(true, "x")], 20);
        let mut g = goal("g");
        g.knowledge_fragment = Some("login form lives at /account".into());
        agent
            .run(g, CancelToken::new(), ProgressHandle::noop(), None)
            .await
            .unwrap();
        let last = model.last_request.lock().unwrap();
        let system = &last.as_ref().unwrap().messages[0];
        assert!(system.content.contains("login form lives at /account"));
    }

    #[tokio::test]
    async fn catalog_always_offers_done() {
        let (agent, model) = loop_with(vec![], vec![done(true, "x")], 20);
        agent
            .run(goal("g"), CancelToken::new(), ProgressHandle::noop(), None)
            .await
            .unwrap();
        let last = model.last_request.lock().unwrap();
        let tools = &last.as_ref().unwrap().tools;
        assert!(tools.iter().any(|t| t.name == "done"));
    }
}
