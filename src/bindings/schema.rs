//! devicetree.org-style JSON-Schema bindings (`spec.md` §4.6, second
//! dialect). Schemas are matched to a node by `$id` ending in
//! `/<compatible>.yaml#` and validated with a hand-rolled subset of
//! JSON-Schema 2019-09 (`type`, `properties`, `required`, `enum`) — no
//! validator crate is grounded anywhere in the example pack, so this stays
//! on `serde_json::Value`, which the crate already depends on (see
//! DESIGN.md).

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::diagnostics::{DiagnosticKind, DtsDiagnostic};

/// One loaded devicetree.org-style schema document.
#[derive(Debug, Clone)]
pub struct JsonSchemaBinding {
    pub id: String,
    pub compatible: Option<String>,
    document: Value,
}

impl JsonSchemaBinding {
    /// The subset of `type`/`properties`/`required`/`enum` validated against
    /// a property bag built from the node's properties
    /// (`name -> serde_json::Value`). Returns one `SchemaValidationFailure`
    /// diagnostic per violation found, each carrying a human-readable
    /// message as its sole argument.
    pub fn validate(&self, properties: &Value) -> Vec<DtsDiagnostic> {
        let mut out = Vec::new();
        validate_against(&self.document, properties, "", &mut out);
        out
    }
}

fn validate_against(schema: &Value, instance: &Value, path: &str, out: &mut Vec<DtsDiagnostic>) {
    let Some(schema_obj) = schema.as_object() else {
        return;
    };

    if let Some(type_value) = schema_obj.get("type") {
        if !type_matches(type_value, instance) {
            out.push(schema_failure(format!(
                "'{}' does not match expected type {}",
                display_path(path),
                type_value
            )));
        }
    }

    if let Some(enum_values) = schema_obj.get("enum").and_then(Value::as_array) {
        if !enum_values.contains(instance) {
            out.push(schema_failure(format!(
                "'{}' must be one of {:?}",
                display_path(path),
                enum_values
            )));
        }
    }

    if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
        let Some(instance_obj) = instance.as_object() else {
            return;
        };
        for req in required {
            if let Some(name) = req.as_str() {
                if !instance_obj.contains_key(name) {
                    out.push(schema_failure(format!(
                        "'{}' is required but missing at '{}'",
                        name,
                        display_path(path)
                    )));
                }
            }
        }
    }

    if let Some(properties) = schema_obj.get("properties").and_then(Value::as_object) {
        let Some(instance_obj) = instance.as_object() else {
            return;
        };
        for (name, sub_schema) in properties {
            if let Some(value) = instance_obj.get(name) {
                let sub_path = if path.is_empty() {
                    name.clone()
                } else {
                    format!("{path}/{name}")
                };
                validate_against(sub_schema, value, &sub_path, out);
            }
        }
    }
}

fn type_matches(type_value: &Value, instance: &Value) -> bool {
    match type_value {
        Value::String(t) => json_type_name(instance) == t,
        Value::Array(types) => types.iter().any(|t| t.as_str() == Some(json_type_name(instance))),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "$"
    } else {
        path
    }
}

fn schema_failure(message: String) -> DtsDiagnostic {
    DtsDiagnostic::new(DiagnosticKind::SchemaValidationFailure, Default::default()).with_args([message])
}

/// Loads every `*.yaml#`-rooted JSON-Schema document under `dir` that
/// carries a `$id`. Non-schema YAML files (Zephyr-style bindings without an
/// `$id`) are skipped rather than reported as errors, since both dialects
/// share the same file extension (`spec.md` §4.6).
pub fn load_schema_bindings(dir: &Path, diagnostics: &mut Vec<DtsDiagnostic>) -> Vec<JsonSchemaBinding> {
    let mut out = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return out;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        if let Some(binding) = load_one_schema(&path, diagnostics) {
            out.push(binding);
        }
    }
    out
}

fn load_one_schema(path: &PathBuf, _diagnostics: &mut Vec<DtsDiagnostic>) -> Option<JsonSchemaBinding> {
    let contents = std::fs::read_to_string(path).ok()?;
    let yaml_value: serde_yaml::Value = serde_yaml::from_str(&contents).ok()?;
    let document: Value = serde_json::to_value(yaml_value).ok()?;

    let id = document.get("$id")?.as_str()?.to_string();
    let compatible = compatible_from_id(&id);
    Some(JsonSchemaBinding { id, compatible, document })
}

fn compatible_from_id(id: &str) -> Option<String> {
    let file_name = id.rsplit('/').next()?;
    let without_fragment = file_name.trim_end_matches('#');
    without_fragment.strip_suffix(".yaml").map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flags_missing_required_and_wrong_type() {
        let schema = json!({
            "$id": "http://devicetree.org/schemas/vnd,widget.yaml#",
            "type": "object",
            "properties": {
                "reg": { "type": "array" },
                "status": { "type": "string", "enum": ["okay", "disabled"] }
            },
            "required": ["reg"]
        });
        let binding = JsonSchemaBinding {
            id: schema["$id"].as_str().unwrap().to_string(),
            compatible: compatible_from_id(schema["$id"].as_str().unwrap()),
            document: schema,
        };
        assert_eq!(binding.compatible.as_deref(), Some("vnd,widget"));

        let instance = json!({ "status": "enabled" });
        let diags = binding.validate(&instance);
        assert!(diags.len() >= 2);
    }
}
