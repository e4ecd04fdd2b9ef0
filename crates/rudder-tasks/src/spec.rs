// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a caller asked for.  Immutable after creation: the planner,
/// executor, and verifier all read the same spec.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    pub goal: String,
    #[serde(default)]
    pub inputs: HashMap<String, Value>,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub budget: TaskBudget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<OutputSchema>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u32>,
}

fn default_max_retries() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBudget {
    /// Repair attempts allowed after verification failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Total tool calls across all attempts of this task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tool_calls: Option<u32>,
}

impl Default for TaskBudget {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            max_tool_calls: None,
        }
    }
}

/// Structural output contract: required top-level fields and optional
/// primitive types per field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSchema {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub types: HashMap<String, SchemaType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl SchemaType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            SchemaType::String => value.is_string(),
            SchemaType::Number => value.is_number(),
            SchemaType::Boolean => value.is_boolean(),
            SchemaType::Array => value.is_array(),
            SchemaType::Object => value.is_object(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SchemaType::String => "string",
            SchemaType::Number => "number",
            SchemaType::Boolean => "boolean",
            SchemaType::Array => "array",
            SchemaType::Object => "object",
        }
    }
}

/// One step of a plan.  The closed template set and the free-form agent
/// goal are the only two shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanStep {
    Template {
        step_id: String,
        template_id: String,
        inputs: Value,
    },
    AgentGoal {
        step_id: String,
        goal: String,
        hints: Vec<String>,
    },
}

impl PlanStep {
    pub fn step_id(&self) -> &str {
        match self {
            PlanStep::Template { step_id, .. } => step_id,
            PlanStep::AgentGoal { step_id, .. } => step_id,
        }
    }
}

/// Where a plan came from; recorded on the `plan_created` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    Rules,
    LlmFallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub step: PlanStep,
    pub source: PlanSource,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn spec_deserializes_with_defaults() {
        let spec: TaskSpec = serde_json::from_value(json!({ "goal": "extract titles" })).unwrap();
        assert_eq!(spec.goal, "extract titles");
        assert_eq!(spec.budget.max_retries, 1);
        assert!(spec.output_schema.is_none());
    }

    #[test]
    fn schema_type_matching() {
        assert!(SchemaType::String.matches(&json!("x")));
        assert!(SchemaType::Array.matches(&json!([])));
        assert!(!SchemaType::Number.matches(&json!("7")));
    }

    #[test]
    fn plan_step_serializes_tagged() {
        let step = PlanStep::AgentGoal {
            step_id: "s1".into(),
            goal: "g".into(),
            hints: vec![],
        };
        let v = serde_json::to_value(&step).unwrap();
        assert_eq!(v["type"], "agent_goal");
        assert_eq!(v["step_id"], "s1");
    }

    #[test]
    fn plan_source_serializes_snake() {
        assert_eq!(
            serde_json::to_value(PlanSource::LlmFallback).unwrap(),
            "llm_fallback"
        );
    }
}
