// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::spec::OutputSchema;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeMismatch {
    pub field: String,
    pub expected: String,
    pub actual: String,
}

/// Outcome of matching a run result against the task's output schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub pass: bool,
    pub missing_fields: Vec<String>,
    pub type_mismatches: Vec<TypeMismatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Verification {
    pub fn passing() -> Self {
        Self {
            pass: true,
            missing_fields: Vec::new(),
            type_mismatches: Vec::new(),
            reason: None,
        }
    }
}

/// Structural check: required keys exist and typed keys carry the declared
/// primitive type.  Fields are looked up at the result's top level, then
/// under a `result` sub-object (executors commonly nest their payload).
pub fn verify(result: &Value, schema: &OutputSchema) -> Verification {
    let mut missing = Vec::new();
    let mut mismatches = Vec::new();

    for field in &schema.required {
        match lookup(result, field) {
            None => missing.push(field.clone()),
            Some(value) => {
                if let Some(expected) = schema.types.get(field) {
                    if !expected.matches(value) {
                        mismatches.push(TypeMismatch {
                            field: field.clone(),
                            expected: expected.name().to_string(),
                            actual: json_type_name(value).to_string(),
                        });
                    }
                }
            }
        }
    }
    // Typed-but-optional fields are checked only when present.
    for (field, expected) in &schema.types {
        if schema.required.contains(field) {
            continue;
        }
        if let Some(value) = lookup(result, field) {
            if !expected.matches(value) {
                mismatches.push(TypeMismatch {
                    field: field.clone(),
                    expected: expected.name().to_string(),
                    actual: json_type_name(value).to_string(),
                });
            }
        }
    }

    let pass = missing.is_empty() && mismatches.is_empty();
    let reason = (!pass).then(|| {
        format!(
            "{} missing field(s), {} type mismatch(es)",
            missing.len(),
            mismatches.len()
        )
    });
    Verification {
        pass,
        missing_fields: missing,
        type_mismatches: mismatches,
        reason,
    }
}

/// Schema repair hints: one actionable line per defect, fed to the repair
/// plan's agent goal.
pub fn repair_hints(verification: &Verification) -> Vec<String> {
    let mut hints = Vec::new();
    for field in &verification.missing_fields {
        hints.push(format!(
            "The result lacks the required field '{field}'; extract it from the page."
        ));
    }
    for m in &verification.type_mismatches {
        hints.push(format!(
            "Field '{}' should be a {} but was a {}; re-extract it in the right shape.",
            m.field, m.expected, m.actual
        ));
    }
    hints
}

fn lookup<'a>(result: &'a Value, field: &str) -> Option<&'a Value> {
    result
        .get(field)
        .or_else(|| result.get("result").and_then(|r| r.get(field)))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::SchemaType;
    use serde_json::json;
    use std::collections::HashMap;

    fn schema(required: &[&str], types: &[(&str, SchemaType)]) -> OutputSchema {
        OutputSchema {
            required: required.iter().map(|s| s.to_string()).collect(),
            types: types
                .iter()
                .map(|(k, t)| (k.to_string(), *t))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn all_present_and_typed_passes() {
        let v = verify(
            &json!({"title": "X", "count": 3}),
            &schema(&["title", "count"], &[("title", SchemaType::String), ("count", SchemaType::Number)]),
        );
        assert!(v.pass);
        assert!(v.reason.is_none());
    }

    #[test]
    fn missing_field_is_reported() {
        let v = verify(&json!({"title": "X"}), &schema(&["title", "price"], &[]));
        assert!(!v.pass);
        assert_eq!(v.missing_fields, vec!["price"]);
        assert!(v.reason.unwrap().contains("1 missing"));
    }

    #[test]
    fn type_mismatch_is_reported() {
        let v = verify(
            &json!({"count": "three"}),
            &schema(&["count"], &[("count", SchemaType::Number)]),
        );
        assert!(!v.pass);
        assert_eq!(v.type_mismatches[0].field, "count");
        assert_eq!(v.type_mismatches[0].expected, "number");
        assert_eq!(v.type_mismatches[0].actual, "string");
    }

    #[test]
    fn fields_found_under_nested_result() {
        let v = verify(
            &json!({"result": {"title": "X"}}),
            &schema(&["title"], &[]),
        );
        assert!(v.pass);
    }

    #[test]
    fn optional_typed_field_checked_only_when_present() {
        let s = schema(&[], &[("tags", SchemaType::Array)]);
        assert!(verify(&json!({}), &s).pass);
        assert!(!verify(&json!({"tags": "a,b"}), &s).pass);
    }

    #[test]
    fn repair_hints_cover_both_defect_kinds() {
        let v = verify(
            &json!({"count": "three"}),
            &schema(&["title", "count"], &[("count", SchemaType::Number)]),
        );
        let hints = repair_hints(&v);
        assert_eq!(hints.len(), 2);
        assert!(hints[0].contains("title"));
        assert!(hints[1].contains("count"));
    }
}
