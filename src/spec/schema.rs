//! Structural validation against the embedded JSON Schema.

use jsonschema::JSONSchema;
use serde_json::Value;
use std::sync::OnceLock;

use crate::error::{EngineError, EngineResult};

const SCHEMA_SOURCE: &str = include_str!("../../schema/operation-spec.schema.json");

/// The embedded schema, compiled once per process
fn compiled_schema() -> EngineResult<&'static JSONSchema> {
    static SCHEMA: OnceLock<Result<JSONSchema, String>> = OnceLock::new();
    SCHEMA
        .get_or_init(|| {
            let schema_value: Value = serde_json::from_str(SCHEMA_SOURCE)
                .map_err(|e| format!("Failed to parse schema: {}", e))?;
            JSONSchema::compile(&schema_value)
                .map_err(|e| format!("Failed to compile schema: {}", e))
        })
        .as_ref()
        .map_err(|e| EngineError::SpecValidation(e.clone()))
}

/// Validate a raw spec document before the typed parse.
pub fn validate_against_schema(document: &Value) -> EngineResult<()> {
    let compiled_schema = compiled_schema()?;

    if let Err(errors) = compiled_schema.validate(document) {
        let error_messages: Vec<String> = errors
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    format!("  - {}", e)
                } else {
                    format!("  - {}: {}", path, e)
                }
            })
            .collect();
        return Err(EngineError::SpecValidation(format!(
            "Schema validation failed:\n{}",
            error_messages.join("\n")
        )));
    }

    Ok(())
}
