//! Cross-provider consistency validation.
//!
//! Factual subjects (dates, prices, ranked lists, places) need at least
//! two independent providers that agree before a result is accepted.
//! Trend subjects are accepted from a single provider, flagged with a
//! `single_source` warning.
//!
//! This is a rule engine on purpose; swap the [`SubjectClassifier`] or
//! the [`Fingerprint`] impls to change what "factual" and "agree" mean.

mod indicators;
mod validator;

pub use indicators::{
    Indicator, RuleClassifier, SubjectClassifier, PLACE_PATTERN, PRICE_PATTERN, RANKING_PATTERN,
    SEASON_PATTERN, YEAR_PATTERN,
};
pub use validator::{jaccard, tokens, ConsistencyValidator};

use serde::{Deserialize, Serialize};

/// Normalised text used to compare items from different providers.
pub trait Fingerprint {
    fn fingerprint(&self) -> String;
}

impl Fingerprint for String {
    fn fingerprint(&self) -> String {
        self.clone()
    }
}

/// Non-fatal observations attached to a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyWarning {
    /// Accepted on the word of one provider
    SingleSource,
}

/// Why a verdict is invalid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    InsufficientSources { found: usize, required: usize },
    Inconsistent { score: f64, threshold: f64 },
}

/// The validator's decision about one acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyVerdict {
    pub valid: bool,
    pub is_factual: bool,
    pub confidence: f64,
    pub required_sources: usize,

    #[serde(default)]
    pub warnings: Vec<ConsistencyWarning>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectionReason>,
}

/// Validator tuning, part of the engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    /// Minimum similarity for two sources to count as agreeing
    pub threshold: f64,

    /// Independent successes a factual subject needs
    pub required_sources: usize,

    /// Extra place names that mark a subject as factual
    pub extra_places: Vec<String>,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            threshold: 0.9,
            required_sources: 2,
            extra_places: Vec::new(),
        }
    }
}
