//! # quarry-runtime
//!
//! Async, networked half of the Quarry acquisition engine.
//!
//! `quarry-core` decides what an attempt means; this crate makes the
//! attempts. It provides:
//! - the [`Provider`] trait and the built-in HTTP adapters (feature `http`)
//! - the retry wrapper, health prober and request budgets ([`resilience`])
//! - the [`FallbackOrchestrator`] that walks providers tier by tier
//! - an [`Engine`] that builds orchestrators from an [`EngineConfig`](quarry_core::EngineConfig)
//!
//! ## Guarantees
//!
//! Provider failures never surface as `Err`. They end up in the attempt
//! ledger of the [`AcquisitionResult`](quarry_core::AcquisitionResult), and
//! the caller always gets a result, even when every provider failed.
//!
//! ## Example
//!
//! ```rust,ignore
//! use quarry_core::AcquisitionRequest;
//! use quarry_runtime::{Engine, RequestContext};
//!
//! let engine = Engine::builtin()?;
//! let request = AcquisitionRequest::new("minimalist interior").with_limit(10);
//! let result = engine.images(&request, &RequestContext::new()).await?;
//!
//! for record in &result.attempts {
//!     println!("{} -> {:?}", record.source, record.status);
//! }
//! ```

pub mod cache;
pub mod context;
pub mod engine;
pub mod orchestrator;
pub mod providers;
pub mod resilience;

pub use cache::HealthCache;
pub use context::RequestContext;
pub use engine::{Engine, EngineHealth};
pub use orchestrator::{
    CorroboratedResult, FallbackOrchestrator, FallbackOrchestratorBuilder, HealthEntry,
    OrchestratorPolicy, RuntimeError,
};
pub use providers::{Provider, ProviderError, ProviderFactory, ProviderRegistry};
pub use resilience::{BudgetTracker, HealthProber};

/// Re-exported so callers can build a [`RequestContext`] from their own token.
pub use tokio_util::sync::CancellationToken;
