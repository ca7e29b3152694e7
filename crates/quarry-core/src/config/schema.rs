//! JSON Schema validation for engine configuration files.
//!
//! Configs are checked against `schema/engine-config.schema.json` before
//! they are deserialized, so structural mistakes come back as a list of
//! located messages rather than a single serde error.

use std::sync::OnceLock;

use super::ConfigError;

const ENGINE_CONFIG_SCHEMA_JSON: &str =
    include_str!("../../../../schema/engine-config.schema.json");

static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

fn get_validator() -> Result<&'static jsonschema::Validator, ConfigError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = serde_json::from_str(ENGINE_CONFIG_SCHEMA_JSON)
            .map_err(|e| format!("Invalid schema JSON: {}", e))?;
        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result
        .as_ref()
        .map_err(|e| ConfigError::SchemaLoad(e.clone()))
}

/// Validate a raw config document.
pub fn validate_config_schema(value: &serde_json::Value) -> Result<(), ConfigError> {
    let validator = get_validator()?;

    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Schema(errors))
    }
}
