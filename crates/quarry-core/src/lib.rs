//! # quarry-core
//!
//! Deterministic building blocks of the Quarry acquisition engine.
//!
//! Nothing in this crate touches the network. It defines:
//! - the request and provider model ([`AcquisitionRequest`], [`ProviderDescriptor`], [`Tier`])
//! - the outcome taxonomy every provider translates into ([`Outcome`])
//! - the append-only attempt ledger and final result ([`AttemptLedger`], [`AcquisitionResult`])
//! - health scoring ([`health::score`], [`HealthSnapshot`])
//! - retry arithmetic ([`RetryPolicy`])
//! - the per-request state machine ([`RequestLifecycle`])
//! - the consistency validator ([`ConsistencyValidator`])
//! - engine configuration with JSON Schema validation ([`EngineConfig`])
//!
//! ## Key Guarantees
//!
//! 1. **Ordered**: attempt records are appended in try order and never edited
//! 2. **Honest**: `chosen` is set exactly when some record is a success
//! 3. **Typed**: vendor failures are data ([`Outcome`]), never panics or errors
//!
//! ## Example
//!
//! ```rust
//! use quarry_core::{AttemptLedger, Outcome, ProviderId};
//!
//! let mut ledger = AttemptLedger::new();
//! ledger.record_outcome::<u8>(&ProviderId::new("pexels"), &Outcome::RateLimited, 3);
//! ledger.record_outcome(&ProviderId::new("pixabay"), &Outcome::Success(vec![1, 2, 3]), 1);
//!
//! assert_eq!(ledger.first_success().map(|r| r.source.as_str()), Some("pixabay"));
//! ```

pub mod config;
pub mod consistency;
pub mod health;
pub mod items;
pub mod ledger;
pub mod lifecycle;
pub mod outcome;
pub mod retry;
pub mod types;

pub use config::{ConcurrencyMode, ConfigError, EngineConfig, HealthConfig, ProviderConfig};
pub use consistency::{
    ConsistencyConfig, ConsistencyValidator, ConsistencyVerdict, ConsistencyWarning, Fingerprint,
    RejectionReason, RuleClassifier, SubjectClassifier,
};
pub use health::{HealthBand, HealthSnapshot, ProbeSample, TierThresholds};
pub use items::{ImageItem, SourceSnippet, TopicKeyword};
pub use ledger::{AcquisitionResult, AttemptLedger, AttemptRecord, AttemptStatus, FinalState};
pub use lifecycle::{LifecycleError, ProviderState, RequestLifecycle, RequestState};
pub use outcome::{ErrorCode, Outcome};
pub use retry::RetryPolicy;
pub use types::{AcquisitionRequest, Capability, Category, ProviderDescriptor, ProviderId, Tier};
