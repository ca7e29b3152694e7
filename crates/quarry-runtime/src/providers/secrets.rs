//! Vendor keys for the keyed image adapters.
//!
//! A key is wrapped in [`ApiCredential`] as soon as it leaves the
//! environment. Formatting it never shows the value, and the only way to
//! read it back is [`ApiCredential::expose`] at the point it goes on the
//! wire.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use super::ProviderError;

pub struct ApiCredential {
    value: SecretString,
    label: &'static str,
    /// Variable the key was read from; `None` when handed over directly
    env_var: Option<String>,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, label: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            label,
            env_var: None,
        }
    }

    /// Read `env_var`. Unset and whitespace-only both count as missing and
    /// map to `NotConfigured`, which the orchestrator records as unavailable.
    pub fn from_env(env_var: &str, label: &'static str) -> Result<Self, ProviderError> {
        let value = std::env::var(env_var).unwrap_or_default();
        let value = value.trim();
        if value.is_empty() {
            return Err(ProviderError::NotConfigured(format!(
                "{label} missing: set {env_var}"
            )));
        }
        Ok(Self {
            value: SecretString::from(value.to_string()),
            label,
            env_var: Some(env_var.to_string()),
        })
    }

    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn env_var(&self) -> Option<&str> {
        self.env_var.as_deref()
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("label", &self.label)
            .field("env_var", &self.env_var)
            .field("value", &"***")
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.env_var {
            Some(var) => write!(f, "{} (${}) ***", self.label, var),
            None => write!(f, "{} ***", self.label),
        }
    }
}
