//! The shared outcome taxonomy every provider translates into.
//!
//! Vendor-specific HTTP statuses and payloads never leave the provider
//! adapters; the orchestrator only ever matches on [`Outcome`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of one provider invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// At least one item of the expected kind
    Success(Vec<T>),

    /// The provider answered but nothing usable survived filtering
    Empty,

    /// Missing or rejected credentials; never retried
    ConfigError(String),

    /// Vendor quota or throttling (HTTP 429)
    RateLimited,

    /// Vendor-side failure (HTTP 5xx)
    UpstreamError(u16),

    /// The invocation exceeded its own timeout
    Timeout,

    /// Anything else; the detail stays server-side
    UnknownError(String),
}

impl<T> Outcome<T> {
    /// Transient failures worth another invocation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Outcome::RateLimited | Outcome::UpstreamError(_) | Outcome::Timeout
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(items) if !items.is_empty())
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, Outcome::Success(_) | Outcome::Empty)
    }

    /// `Success` with zero items is not a success.
    pub fn normalize(self) -> Self {
        match self {
            Outcome::Success(items) if items.is_empty() => Outcome::Empty,
            other => other,
        }
    }

    /// Split into `Ok` for answers (including `Empty`) and `Err` for failures.
    ///
    /// This is the shape the retry wrapper works on.
    pub fn into_result(self) -> Result<Outcome<T>, Outcome<T>> {
        let outcome = self.normalize();
        if outcome.is_failure() {
            Err(outcome)
        } else {
            Ok(outcome)
        }
    }

    /// Error code reported in the attempt ledger, if any.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Outcome::Success(_) | Outcome::Empty => None,
            Outcome::ConfigError(_) => Some(ErrorCode::InvalidConfig),
            Outcome::RateLimited => Some(ErrorCode::RateLimit),
            Outcome::UpstreamError(_) => Some(ErrorCode::UpstreamError),
            Outcome::Timeout => Some(ErrorCode::TimeoutError),
            Outcome::UnknownError(_) => Some(ErrorCode::UnknownError),
        }
    }

    pub fn item_count(&self) -> usize {
        match self {
            Outcome::Success(items) => items.len(),
            _ => 0,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(items) => Outcome::Success(items.into_iter().map(f).collect()),
            Outcome::Empty => Outcome::Empty,
            Outcome::ConfigError(reason) => Outcome::ConfigError(reason),
            Outcome::RateLimited => Outcome::RateLimited,
            Outcome::UpstreamError(status) => Outcome::UpstreamError(status),
            Outcome::Timeout => Outcome::Timeout,
            Outcome::UnknownError(detail) => Outcome::UnknownError(detail),
        }
    }
}

impl<T> fmt::Display for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success(items) => write!(f, "success ({} items)", items.len()),
            Outcome::Empty => write!(f, "no results"),
            Outcome::ConfigError(reason) => write!(f, "configuration error: {}", reason),
            Outcome::RateLimited => write!(f, "rate limited"),
            Outcome::UpstreamError(status) => write!(f, "upstream error (HTTP {})", status),
            Outcome::Timeout => write!(f, "timed out"),
            Outcome::UnknownError(detail) => write!(f, "unknown error: {}", detail),
        }
    }
}

/// Machine-readable failure codes surfaced in attempt records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Provider unknown or not configured
    SourceUnavailable,

    /// Skipped because its health score was below the tier threshold
    SourceUnhealthy,

    /// Credentials missing or rejected
    InvalidConfig,

    RateLimit,

    /// Local per-provider request budget spent; no call was made
    BudgetExhausted,

    UpstreamError,
    TimeoutError,
    UnknownError,
    Cancelled,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::SourceUnavailable => "SOURCE_UNAVAILABLE",
            ErrorCode::SourceUnhealthy => "SOURCE_UNHEALTHY",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::RateLimit => "RATE_LIMIT",
            ErrorCode::BudgetExhausted => "BUDGET_EXHAUSTED",
            ErrorCode::UpstreamError => "UPSTREAM_ERROR",
            ErrorCode::TimeoutError => "TIMEOUT_ERROR",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
            ErrorCode::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Outcome::<()>::RateLimited.is_retryable());
        assert!(Outcome::<()>::UpstreamError(503).is_retryable());
        assert!(Outcome::<()>::Timeout.is_retryable());

        assert!(!Outcome::<()>::ConfigError("missing key".into()).is_retryable());
        assert!(!Outcome::<()>::UnknownError("boom".into()).is_retryable());
        assert!(!Outcome::<()>::Empty.is_retryable());
        assert!(!Outcome::Success(vec![1]).is_retryable());
    }

    #[test]
    fn test_empty_success_normalizes_to_empty() {
        let outcome: Outcome<u8> = Outcome::Success(vec![]);
        assert_eq!(outcome.into_result(), Ok(Outcome::Empty));
    }

    #[test]
    fn test_into_result_splits_answers_from_failures() {
        assert!(Outcome::Success(vec![1]).into_result().is_ok());
        assert!(Outcome::<u8>::Empty.into_result().is_ok());
        assert_eq!(
            Outcome::<u8>::RateLimited.into_result(),
            Err(Outcome::RateLimited)
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Outcome::<()>::RateLimited.error_code(), Some(ErrorCode::RateLimit));
        assert_eq!(Outcome::<()>::Timeout.error_code(), Some(ErrorCode::TimeoutError));
        assert_eq!(Outcome::<()>::Empty.error_code(), None);
        assert_eq!(
            serde_json::to_string(&ErrorCode::UpstreamError).unwrap(),
            "\"UPSTREAM_ERROR\""
        );
    }
}
