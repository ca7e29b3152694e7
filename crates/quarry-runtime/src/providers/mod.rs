//! Provider abstraction and the built-in adapters.
//!
//! A provider is a client for one external source. It exposes a single
//! uniform [`Provider::attempt`] and translates whatever the vendor sends
//! back into the shared [`Outcome`] taxonomy. Providers never retry; the
//! orchestrator wraps them.
//!
//! ## Security
//!
//! Credentials go through the [`secrets`] module. See [`ApiCredential`].

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use quarry_core::{AcquisitionRequest, Outcome, ProbeSample, ProviderDescriptor};

mod factory;
mod keywords;
pub mod secrets;
mod unconfigured;

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "http")]
mod duckduckgo;
#[cfg(feature = "http")]
mod feeds;
#[cfg(feature = "http")]
mod google;
#[cfg(feature = "http")]
mod markup;
#[cfg(feature = "http")]
mod pexels;
#[cfg(feature = "http")]
mod pixabay;
#[cfg(feature = "http")]
mod snippet;
#[cfg(feature = "http")]
mod unsplash;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use keywords::{fallback_keywords, KeywordLibraryFactory, KeywordLibraryProvider};
pub use secrets::ApiCredential;
pub use unconfigured::Unconfigured;

#[cfg(feature = "http")]
pub use duckduckgo::{DuckDuckGoFactory, DuckDuckGoProvider};
#[cfg(feature = "http")]
pub use feeds::{TrendFeedFactory, TrendFeedProvider};
#[cfg(feature = "http")]
pub use google::{GoogleImagesFactory, GoogleImagesProvider};
#[cfg(feature = "http")]
pub use http::HttpSettings;
#[cfg(feature = "http")]
pub use pexels::{PexelsFactory, PexelsProvider};
#[cfg(feature = "http")]
pub use pixabay::{PixabayFactory, PixabayProvider};
#[cfg(feature = "http")]
pub use snippet::{PageSnippetFactory, PageSnippetProvider};
#[cfg(feature = "http")]
pub use unsplash::{UnsplashFactory, UnsplashProvider};

/// Errors raised inside provider adapters.
///
/// These never leave the provider layer as errors: [`into_outcome`](Self::into_outcome)
/// turns them into data the orchestrator records.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Response parse error: {0}")]
    ParseError(String),

    #[error("Credentials rejected (HTTP {0})")]
    AuthError(u16),

    #[error("Request timed out")]
    Timeout,

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Translate into the shared taxonomy.
    pub fn into_outcome<T>(self) -> Outcome<T> {
        match self {
            ProviderError::RateLimited { .. } => Outcome::RateLimited,
            ProviderError::ApiError { status, .. } if status >= 500 => Outcome::UpstreamError(status),
            ProviderError::AuthError(status) => {
                Outcome::ConfigError(format!("credentials rejected (HTTP {})", status))
            }
            ProviderError::NotConfigured(reason) => Outcome::ConfigError(reason),
            ProviderError::Timeout => Outcome::Timeout,
            other => Outcome::UnknownError(other.to_string()),
        }
    }
}

/// A client for one external source.
///
/// Implementations must be cheap to share (`Arc`) and safe to call from
/// several requests at once.
#[async_trait]
pub trait Provider: Send + Sync {
    type Item: Send + 'static;

    fn descriptor(&self) -> &ProviderDescriptor;

    /// Make one call to the source. No retries, no sleeping.
    async fn attempt(&self, request: &AcquisitionRequest) -> Outcome<Self::Item>;

    /// Why a provider that is not ready cannot be called. Recorded in the
    /// attempt ledger in place of a call.
    fn unavailable_reason(&self) -> Option<&str> {
        None
    }

    /// Issue a lightweight reachability probe.
    ///
    /// `None` means the provider has nothing to probe; it is then treated
    /// as healthy.
    async fn health_check(&self, _timeout: Duration) -> Option<ProbeSample> {
        None
    }
}
