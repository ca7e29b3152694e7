use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::schema::validate_config_schema;
use crate::consistency::ConsistencyConfig;
use crate::health::TierThresholds;
use crate::items::is_http_url;
use crate::retry::RetryPolicy;
use crate::types::{Capability, Category, Tier};

/// The configuration shipped with the binary.
pub const BUILTIN_CONFIG_YAML: &str = include_str!("../../../../config/default.yaml");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to load schema: {0}")]
    SchemaLoad(String),

    #[error("Config does not match schema: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// How providers inside one tier are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyMode {
    /// One at a time, in configured order
    #[default]
    Sequential,

    /// All eligible providers of a tier at once; first success wins
    Race,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,

    /// How long a snapshot stays fresh
    #[serde(with = "super::duration")]
    pub ttl: Duration,

    #[serde(with = "super::duration")]
    pub probe_timeout: Duration,

    pub thresholds: TierThresholds,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(300),
            probe_timeout: Duration::from_secs(5),
            thresholds: TierThresholds::default(),
        }
    }
}

/// Local request budget for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub max_requests: u32,

    #[serde(with = "super::duration")]
    pub window: Duration,
}

/// One configured provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique name; becomes the provider id in attempt records
    pub name: String,

    /// Adapter to build (`unsplash`, `pexels`, ...)
    pub kind: String,

    pub tier: Tier,
    pub capability: Capability,

    /// Category a keyword source serves; `None` serves all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,

    /// Overrides the adapter's default API endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_endpoint: Option<String>,

    /// Environment variable holding the credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_env: Option<String>,

    /// Second credential, for vendors that need two (search engine id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_credential_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetConfig>,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, tier: Tier, capability: Capability) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            tier,
            capability,
            category: None,
            endpoint: None,
            health_endpoint: None,
            credential_env: None,
            secondary_credential_env: None,
            budget: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_health_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.health_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_credential_env(mut self, var: impl Into<String>) -> Self {
        self.credential_env = Some(var.into());
        self
    }

    pub fn with_secondary_credential_env(mut self, var: impl Into<String>) -> Self {
        self.secondary_credential_env = Some(var.into());
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_budget(mut self, max_requests: u32, window: Duration) -> Self {
        self.budget = Some(BudgetConfig { max_requests, window });
        self
    }
}

fn default_attempt_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub mode: ConcurrencyMode,

    /// Bound on a single provider invocation
    #[serde(default = "default_attempt_timeout", with = "super::duration")]
    pub attempt_timeout: Duration,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub consistency: ConsistencyConfig,

    pub providers: Vec<ProviderConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: ConcurrencyMode::default(),
            attempt_timeout: default_attempt_timeout(),
            retry: RetryPolicy::default(),
            health: HealthConfig::default(),
            consistency: ConsistencyConfig::default(),
            providers: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let raw: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(raw)
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(raw)
    }

    /// Load a config file; `.json` files are read as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    /// The built-in provider chain.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_yaml(BUILTIN_CONFIG_YAML)
    }

    fn from_value(raw: serde_json::Value) -> Result<Self, ConfigError> {
        validate_config_schema(&raw)?;
        let config: EngineConfig = serde_json::from_value(raw)?;
        config.validate()?;
        tracing::debug!(
            providers = config.providers.len(),
            mode = ?config.mode,
            "engine config loaded"
        );
        Ok(config)
    }

    /// Semantic checks the schema cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.attempt_timeout.is_zero() {
            return Err(invalid("attempt_timeout must be greater than zero"));
        }

        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1"));
        }
        if !(retry.backoff_multiplier >= 1.0) {
            return Err(invalid("retry.backoff_multiplier must be at least 1.0"));
        }
        if retry.initial_delay > retry.max_delay {
            return Err(invalid("retry.initial_delay must not exceed retry.max_delay"));
        }

        if self.health.enabled && self.health.probe_timeout.is_zero() {
            return Err(invalid("health.probe_timeout must be greater than zero"));
        }
        let t = &self.health.thresholds;
        for (name, value) in [("primary", t.primary), ("backup", t.backup), ("last_resort", t.last_resort)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("health.thresholds.{} must be within [0, 1]", name)));
            }
        }

        if !(0.0..=1.0).contains(&self.consistency.threshold) {
            return Err(invalid("consistency.threshold must be within [0, 1]"));
        }
        if self.consistency.required_sources == 0 {
            return Err(invalid("consistency.required_sources must be at least 1"));
        }

        self.validate_providers()
    }

    fn validate_providers(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();

        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return Err(invalid("provider name must not be empty"));
            }
            if !seen.insert(provider.name.as_str()) {
                return Err(invalid(format!("Duplicate provider name: {}", provider.name)));
            }

            for (field, url) in [
                ("endpoint", &provider.endpoint),
                ("health_endpoint", &provider.health_endpoint),
            ] {
                if let Some(url) = url {
                    if !is_http_url(url) {
                        return Err(invalid(format!(
                            "provider '{}': {} must be an http(s) URL",
                            provider.name, field
                        )));
                    }
                }
            }

            if provider.tier == Tier::LastResort
                && (provider.credential_env.is_some() || provider.secondary_credential_env.is_some())
            {
                return Err(invalid(format!(
                    "provider '{}': last_resort providers must not need credentials",
                    provider.name
                )));
            }

            if let Some(budget) = &provider.budget {
                if budget.max_requests == 0 || budget.window.is_zero() {
                    return Err(invalid(format!(
                        "provider '{}': budget needs max_requests >= 1 and a non-zero window",
                        provider.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Providers with `capability`, in try order: tier first, then config order.
    pub fn providers_for(&self, capability: Capability) -> Vec<&ProviderConfig> {
        let mut providers: Vec<&ProviderConfig> = self
            .providers
            .iter()
            .filter(|p| p.capability == capability)
            .collect();
        providers.sort_by_key(|p| p.tier);
        providers
    }

    /// Like [`providers_for`](Self::providers_for), keeping only providers
    /// that serve `category` (or every category).
    pub fn providers_serving(&self, capability: Capability, category: Option<Category>) -> Vec<&ProviderConfig> {
        self.providers_for(capability)
            .into_iter()
            .filter(|p| match (p.category, category) {
                (Some(served), Some(wanted)) => served == wanted,
                _ => true,
            })
            .collect()
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}
