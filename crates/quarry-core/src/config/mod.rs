//! Engine configuration.
//!
//! Configs are YAML or JSON documents validated against the embedded JSON
//! Schema and then checked semantically before use.

pub mod duration;
mod parser;
mod schema;

pub use parser::{
    BudgetConfig, ConcurrencyMode, ConfigError, EngineConfig, HealthConfig, ProviderConfig,
    BUILTIN_CONFIG_YAML,
};
pub use schema::validate_config_schema;
