use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use slotform_contracts::{
    contracts_manifest_v1, FormDocument, ACTION_LISTEN, ENGINE_CONFIG_SCHEMA,
    FORM_DEFINITION_SCHEMA,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config failed: {0}")]
    Read(String),
    #[error("parse config failed: {0}")]
    Parse(String),
    #[error("schema load failed: {0}")]
    SchemaLoad(String),
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),
    #[error("unsupported config: {0}")]
    UnsupportedConfig(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub policy: Policy,
    pub domain: Domain,
    pub forms: Vec<FormDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    #[serde(default = "default_listen_action")]
    pub listen_action: String,
    #[serde(default = "default_strip_intent_prefix")]
    pub strip_intent_prefix: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            listen_action: default_listen_action(),
            strip_intent_prefix: default_strip_intent_prefix(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Domain {
    #[serde(default)]
    pub actions: Vec<String>,
}

fn default_listen_action() -> String {
    ACTION_LISTEN.to_string()
}

fn default_strip_intent_prefix() -> bool {
    true
}

pub fn load_and_validate(path: &str) -> Result<Config, ConfigError> {
    let config_text =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(format!("{path}: {e}")))?;
    parse_and_validate(&config_text)
}

pub fn parse_and_validate(config_text: &str) -> Result<Config, ConfigError> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(config_text).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let instance =
        serde_json::to_value(&value).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_against_schema(ENGINE_CONFIG_SCHEMA, &instance)?;
    if let Some(forms) = instance.get("forms").and_then(|f| f.as_array()) {
        for (idx, form) in forms.iter().enumerate() {
            validate_against_schema(FORM_DEFINITION_SCHEMA, form).map_err(|err| match err {
                ConfigError::SchemaValidation(msg) => {
                    ConfigError::SchemaValidation(format!("forms[{idx}]: {msg}"))
                }
                other => other,
            })?;
        }
    }

    // JSON objects are key-sorted; the YAML mapping keeps slot declaration order.
    let cfg: Config =
        serde_yaml::from_value(value).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_runtime_support(&cfg)?;
    Ok(cfg)
}

fn validate_against_schema(
    schema_path: &str,
    instance: &serde_json::Value,
) -> Result<(), ConfigError> {
    let manifest = contracts_manifest_v1();
    let embedded = manifest.schema(schema_path).ok_or_else(|| {
        ConfigError::SchemaLoad(format!("schema {schema_path} is not embedded"))
    })?;
    let schema: serde_json::Value = serde_json::from_str(embedded.body)
        .map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;

    let validator =
        jsonschema::validator_for(&schema).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    if let Err(first) = validator.validate(instance) {
        return Err(ConfigError::SchemaValidation(first.to_string()));
    }
    Ok(())
}

fn validate_runtime_support(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.forms.is_empty() {
        return Err(ConfigError::UnsupportedConfig(
            "forms must declare at least one form".to_string(),
        ));
    }
    let mut seen = BTreeSet::new();
    for form in &cfg.forms {
        if !seen.insert(form.name.as_str()) {
            return Err(ConfigError::UnsupportedConfig(format!(
                "form name {} is declared more than once",
                form.name
            )));
        }
    }
    if cfg.policy.listen_action.trim().is_empty() {
        return Err(ConfigError::UnsupportedConfig(
            "policy.listen_action must not be blank".to_string(),
        ));
    }
    Ok(())
}
