// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use rudder_model::{ChatModel, ChatRequest, Message};

use crate::spec::{Plan, PlanSource, PlanStep, TaskSpec};

/// Goal phrasings that mark a batch extraction over a URL list.
/// Matched case-insensitively; the CJK entries cover the original
/// Chinese-language task phrasing this system grew up with.
const BATCH_KEYWORDS: &[&str] = &[
    "extract", "scrape", "collect", "each page", "every page", "all pages", "batch",
    "抓取", "提取", "采集", "每个页面",
];

/// Goal phrasings that mark a multi-page comparison.
const COMPARE_KEYWORDS: &[&str] = &[
    "compare", "difference", "diff", "versus", " vs ", "对比", "比较", "差异",
];

/// Maps a task spec to a single plan step.
///
/// The rules are deterministic and pure; the optional LLM fallback is
/// consulted only when the rules produce no template match and fallback
/// is enabled.  `plan_created.source` records which path fired.
pub struct Planner {
    fallback: Option<Arc<dyn ChatModel>>,
}

impl Planner {
    pub fn new() -> Self {
        Self { fallback: None }
    }

    pub fn with_llm_fallback(model: Arc<dyn ChatModel>) -> Self {
        Self {
            fallback: Some(model),
        }
    }

    /// Pure rule planning — a function of the spec alone.
    pub fn plan(&self, spec: &TaskSpec) -> Plan {
        let step = rule_step(spec);
        Plan {
            step,
            source: PlanSource::Rules,
        }
    }

    /// Rules first; on a rule miss (agent_goal) with fallback enabled, ask
    /// the classifier whether a template applies after all.
    pub async fn plan_with_fallback(&self, spec: &TaskSpec) -> Plan {
        let rules = self.plan(spec);
        if !matches!(rules.step, PlanStep::AgentGoal { .. }) {
            return rules;
        }
        let Some(model) = &self.fallback else {
            return rules;
        };

        let prompt = format!(
            "Classify this browser task into exactly one word: \
             batch_extract_pages, multi_tab_compare, or agent_goal.\n\nTask: {}\nInputs: {}",
            spec.goal,
            json!(spec.inputs)
        );
        let request = ChatRequest {
            messages: vec![Message::user(prompt)],
            tools: vec![],
        };
        match model.complete(request).await {
            Ok(resp) => {
                let answer = resp.text.trim().to_lowercase();
                debug!(answer = %answer, "llm planner fallback");
                let step = match answer.as_str() {
                    "batch_extract_pages" if urls_of(spec).is_some() => template_step(
                        "batch_extract_pages",
                        batch_inputs(spec),
                    ),
                    "multi_tab_compare" if urls_of(spec).map_or(false, |u| u.len() >= 2) => {
                        template_step("multi_tab_compare", compare_inputs(spec))
                    }
                    _ => return rules,
                };
                Plan {
                    step,
                    source: PlanSource::LlmFallback,
                }
            }
            Err(e) => {
                debug!("llm planner fallback failed, keeping rule plan: {e}");
                rules
            }
        }
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

fn rule_step(spec: &TaskSpec) -> PlanStep {
    let goal = spec.goal.to_lowercase();
    if let Some(urls) = urls_of(spec) {
        if urls.len() >= 2 && COMPARE_KEYWORDS.iter().any(|k| goal.contains(k)) {
            return template_step("multi_tab_compare", compare_inputs(spec));
        }
        if BATCH_KEYWORDS.iter().any(|k| goal.contains(k)) {
            return template_step("batch_extract_pages", batch_inputs(spec));
        }
    }
    PlanStep::AgentGoal {
        step_id: step_id(),
        goal: spec.goal.clone(),
        hints: spec
            .inputs
            .get("hints")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn urls_of(spec: &TaskSpec) -> Option<Vec<String>> {
    let urls: Vec<String> = spec
        .inputs
        .get("urls")?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .map(String::from)
        .collect();
    (!urls.is_empty()).then_some(urls)
}

fn batch_inputs(spec: &TaskSpec) -> Value {
    let mut inputs = json!({ "urls": spec.inputs.get("urls").cloned().unwrap_or(json!([])) });
    for key in ["concurrency", "extract", "sessionId"] {
        if let Some(v) = spec.inputs.get(key) {
            inputs[key] = v.clone();
        }
    }
    inputs
}

fn compare_inputs(spec: &TaskSpec) -> Value {
    let mut inputs = json!({ "urls": spec.inputs.get("urls").cloned().unwrap_or(json!([])) });
    for key in ["extract", "compare", "sessionId"] {
        if let Some(v) = spec.inputs.get(key) {
            inputs[key] = v.clone();
        }
    }
    inputs
}

fn step_id() -> String {
    format!("step_{}", Uuid::new_v4())
}

fn template_step(template_id: &str, inputs: Value) -> PlanStep {
    PlanStep::Template {
        step_id: step_id(),
        template_id: template_id.to_string(),
        inputs,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rudder_model::mock::ScriptedModel;
    use std::collections::HashMap;

    fn spec(goal: &str, inputs: Value) -> TaskSpec {
        TaskSpec {
            goal: goal.into(),
            inputs: inputs
                .as_object()
                .map(|m| m.clone().into_iter().collect::<HashMap<_, _>>())
                .unwrap_or_default(),
            ..TaskSpec::default()
        }
    }

    #[test]
    fn urls_plus_extract_goal_plans_batch() {
        let plan = Planner::new().plan(&spec(
            "extract the title of each page",
            json!({"urls": ["https://a", "https://b"]}),
        ));
        let PlanStep::Template { template_id, inputs, .. } = plan.step else {
            panic!("expected template step");
        };
        assert_eq!(template_id, "batch_extract_pages");
        assert_eq!(inputs["urls"].as_array().unwrap().len(), 2);
        assert_eq!(plan.source, PlanSource::Rules);
    }

    #[test]
    fn compare_phrasing_with_two_urls_plans_compare() {
        let plan = Planner::new().plan(&spec(
            "compare these two product pages",
            json!({"urls": ["https://a", "https://b"]}),
        ));
        let PlanStep::Template { template_id, .. } = plan.step else {
            panic!("expected template step");
        };
        assert_eq!(template_id, "multi_tab_compare");
    }

    #[test]
    fn cjk_goals_match_the_lexicon() {
        let plan = Planner::new().plan(&spec(
            "抓取这些页面的标题",
            json!({"urls": ["https://a"]}),
        ));
        assert!(matches!(plan.step, PlanStep::Template { ref template_id, .. } if template_id == "batch_extract_pages"));
    }

    #[test]
    fn no_urls_plans_agent_goal() {
        let plan = Planner::new().plan(&spec("find the pricing page and summarize it", json!({})));
        assert!(matches!(plan.step, PlanStep::AgentGoal { .. }));
    }

    #[test]
    fn compare_with_single_url_falls_through_to_batch_or_agent() {
        let plan = Planner::new().plan(&spec(
            "compare this page with itself",
            json!({"urls": ["https://a"]}),
        ));
        // One URL can never be a compare; with no batch keyword either it
        // becomes an agent goal.
        assert!(matches!(plan.step, PlanStep::AgentGoal { .. }));
    }

    #[test]
    fn plan_is_deterministic() {
        let planner = Planner::new();
        let s = spec("extract data", json!({"urls": ["https://a"]}));
        let a = serde_json::to_value(&planner.plan(&s).step).unwrap();
        let b = serde_json::to_value(&planner.plan(&s).step).unwrap();
        // Step ids are fresh per call; everything else must be identical.
        assert_eq!(a["type"], b["type"]);
        assert_eq!(a["template_id"], b["template_id"]);
        assert_eq!(a["inputs"], b["inputs"]);
    }

    #[tokio::test]
    async fn fallback_consulted_only_on_rule_miss() {
        let model = Arc::new(ScriptedModel::always_text("batch_extract_pages"));
        let planner = Planner::with_llm_fallback(model.clone());
        // Rules hit: fallback must not be called.
        planner
            .plan_with_fallback(&spec("extract each page", json!({"urls": ["https://a"]})))
            .await;
        assert_eq!(model.remaining(), 1);
    }

    #[tokio::test]
    async fn fallback_promotes_to_template_and_records_source() {
        let model = Arc::new(ScriptedModel::always_text("batch_extract_pages"));
        let planner = Planner::with_llm_fallback(model);
        let plan = planner
            .plan_with_fallback(&spec("grab titles", json!({"urls": ["https://a"]})))
            .await;
        assert_eq!(plan.source, PlanSource::LlmFallback);
        assert!(matches!(plan.step, PlanStep::Template { .. }));
    }

    #[tokio::test]
    async fn fallback_error_keeps_rule_plan() {
        let model = Arc::new(ScriptedModel::new(vec![])); // exhausted → error
        let planner = Planner::with_llm_fallback(model);
        let plan = planner
            .plan_with_fallback(&spec("grab titles", json!({"urls": ["https://a"]})))
            .await;
        assert_eq!(plan.source, PlanSource::Rules);
        assert!(matches!(plan.step, PlanStep::AgentGoal { .. }));
    }
}
