//! Minimal JSON Schema structural validator.
//!
//! The orchestrator only needs enough of JSON Schema to catch a model
//! returning the wrong shape: object `required`/`properties` with `type`
//! checks, recursively. Full keyword coverage (`oneOf`, `pattern`, bounds,
//! ...) is out of scope; add keywords here if a prompt template starts using
//! them.

use serde_json::Value;

/// Check `value` against `schema`, returning the first violation found.
pub fn validate(value: &Value, schema: &Value) -> Result<(), String> {
    let Some(schema_obj) = schema.as_object() else {
        return Ok(());
    };

    if let Some(expected_type) = schema_obj.get("type").and_then(Value::as_str) {
        if !type_matches(value, expected_type) {
            return Err(format!("expected type '{expected_type}', got {}", type_name(value)));
        }
    }

    if let Some(properties) = schema_obj.get("properties").and_then(Value::as_object) {
        let Some(value_obj) = value.as_object() else {
            return Err("expected a JSON object".to_string());
        };

        if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
            for field in required {
                let Some(field_name) = field.as_str() else { continue };
                if !value_obj.contains_key(field_name) {
                    return Err(format!("missing required field '{field_name}'"));
                }
            }
        }

        for (key, sub_schema) in properties {
            if let Some(sub_value) = value_obj.get(key) {
                validate(sub_value, sub_schema).map_err(|e| format!("field '{key}': {e}"))?;
            }
        }
    }

    if let Some(items_schema) = schema_obj.get("items") {
        if let Some(array) = value.as_array() {
            for (i, item) in array.iter().enumerate() {
                validate(item, items_schema).map_err(|e| format!("item [{i}]: {e}"))?;
            }
        }
    }

    Ok(())
}

fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Object(_) => "object",
        Value::Array(_) => "array",
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null => "null",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_field_missing_is_rejected() {
        let schema = json!({"type": "object", "required": ["verdict"], "properties": {"verdict": {"type": "string"}}});
        let value = json!({});
        assert!(validate(&value, &schema).is_err());
    }

    #[test]
    fn well_formed_value_passes() {
        let schema = json!({"type": "object", "required": ["verdict"], "properties": {"verdict": {"type": "string"}}});
        let value = json!({"verdict": "ok"});
        assert!(validate(&value, &schema).is_ok());
    }

    #[test]
    fn wrong_type_is_rejected() {
        let schema = json!({"type": "object", "properties": {"count": {"type": "integer"}}});
        let value = json!({"count": "three"});
        assert!(validate(&value, &schema).is_err());
    }

    #[test]
    fn nested_array_items_are_checked() {
        let schema = json!({"type": "object", "properties": {"items": {"type": "array", "items": {"type": "string"}}}});
        let bad = json!({"items": [1, 2]});
        assert!(validate(&bad, &schema).is_err());
        let good = json!({"items": ["a", "b"]});
        assert!(validate(&good, &schema).is_ok());
    }
}
