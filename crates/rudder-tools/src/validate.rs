// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde_json::Value;

use rudder_runs::RunError;

/// Structural validation of a tool argument object against its declared
/// schema: required fields must be present and typed fields must match.
///
/// This intentionally covers only the subset the catalog declares
/// (`required` plus primitive `type` per property); anything richer is a
/// tool's own concern.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), RunError> {
    let Some(obj) = args.as_object() else {
        return Err(RunError::invalid_parameter(
            "arguments",
            "expected a JSON object",
        ));
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !obj.contains_key(field) {
                return Err(RunError::invalid_parameter(field, "missing required field"));
            }
        }
    }

    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (field, decl) in props {
            let Some(value) = obj.get(field) else {
                continue;
            };
            let Some(expected) = decl.get("type").and_then(Value::as_str) else {
                continue;
            };
            if value.is_null() || matches_type(value, expected) {
                continue;
            }
            return Err(RunError::invalid_parameter(
                field,
                format!("expected {expected}"),
            ));
        }
    }

    Ok(())
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
