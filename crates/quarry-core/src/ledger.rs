//! Attempt ledger: the append-only diagnostic record of a request.
//!
//! One [`AttemptRecord`] is written per provider considered, in the order
//! the orchestrator considered them. Records are never edited after they
//! are appended; the only way to grow a ledger is through the `record_*`
//! methods, which assign the sequence index.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::outcome::{ErrorCode, Outcome};
use crate::types::ProviderId;

/// Generic text surfaced for unknown failures; details stay in the logs.
pub const GENERIC_FAILURE_MESSAGE: &str = "unexpected provider failure";

/// Status of one attempt, as exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    NoResults,
    Error,
    Unavailable,
    Exception,
    Cancelled,
}

/// One provider's entry in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Provider that was tried (or skipped)
    pub source: ProviderId,

    pub status: AttemptStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Position in the ledger, starting at 0
    pub seq: usize,

    /// Whether the provider was actually called. Set by the `record_*`
    /// method that wrote the record; not part of the wire format.
    #[serde(skip)]
    attempted: bool,
}

impl AttemptRecord {
    /// False for skip entries: health skips, unknown or unconfigured
    /// providers, spent budgets and cancellation before the call. A vendor
    /// that rejected the credentials was still called, so its `unavailable`
    /// record counts.
    pub fn was_attempted(&self) -> bool {
        self.attempted
    }

    pub fn is_success(&self) -> bool {
        self.status == AttemptStatus::Success && self.count.unwrap_or(0) > 0
    }
}

/// Append-only, strictly ordered list of attempt records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AttemptLedger {
    records: Vec<AttemptRecord>,
}

impl AttemptLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(
        &mut self,
        source: &ProviderId,
        status: AttemptStatus,
        count: Option<usize>,
        code: Option<ErrorCode>,
        message: Option<String>,
        details: Option<serde_json::Value>,
        attempted: bool,
    ) -> &AttemptRecord {
        let seq = self.records.len();
        self.records.push(AttemptRecord {
            source: source.clone(),
            status,
            count,
            code,
            message,
            details,
            seq,
            attempted,
        });
        &self.records[seq]
    }

    /// Record the final outcome of a provider after its retries.
    ///
    /// `tries` is the number of invocations the retry wrapper made; it is
    /// only reported for failures that were retried.
    pub fn record_outcome<T>(
        &mut self,
        source: &ProviderId,
        outcome: &Outcome<T>,
        tries: u32,
    ) -> &AttemptRecord {
        let tries_detail = |mut details: serde_json::Value| {
            if tries > 1 {
                details["tries"] = json!(tries);
            }
            if details.as_object().map(|o| o.is_empty()).unwrap_or(false) {
                None
            } else {
                Some(details)
            }
        };

        match outcome {
            Outcome::Success(items) if !items.is_empty() => {
                self.push(source, AttemptStatus::Success, Some(items.len()), None, None, None, true)
            }
            Outcome::Success(_) | Outcome::Empty => {
                self.push(source, AttemptStatus::NoResults, Some(0), None, None, None, true)
            }
            Outcome::ConfigError(reason) => self.push(
                source,
                AttemptStatus::Unavailable,
                None,
                outcome.error_code(),
                Some(reason.clone()),
                None,
                true,
            ),
            Outcome::RateLimited => self.push(
                source,
                AttemptStatus::Error,
                None,
                outcome.error_code(),
                Some("provider rate limit reached".to_string()),
                tries_detail(json!({})),
                true,
            ),
            Outcome::UpstreamError(status) => self.push(
                source,
                AttemptStatus::Error,
                None,
                outcome.error_code(),
                Some("upstream service error".to_string()),
                tries_detail(json!({ "http_status": status })),
                true,
            ),
            Outcome::Timeout => self.push(
                source,
                AttemptStatus::Error,
                None,
                outcome.error_code(),
                Some("provider did not respond in time".to_string()),
                tries_detail(json!({})),
                true,
            ),
            Outcome::UnknownError(_) => self.push(
                source,
                AttemptStatus::Exception,
                None,
                outcome.error_code(),
                Some(GENERIC_FAILURE_MESSAGE.to_string()),
                tries_detail(json!({})),
                true,
            ),
        }
    }

    /// Record a provider skipped for low health. Not an attempt.
    pub fn record_unhealthy(&mut self, source: &ProviderId, score: f64, threshold: f64) -> &AttemptRecord {
        self.push(
            source,
            AttemptStatus::Unavailable,
            None,
            Some(ErrorCode::SourceUnhealthy),
            Some("skipped: health score below tier threshold".to_string()),
            Some(json!({ "score": round3(score), "threshold": threshold })),
            false,
        )
    }

    /// Record a provider skipped because its local request budget is spent.
    pub fn record_budget_exhausted(&mut self, source: &ProviderId) -> &AttemptRecord {
        self.push(
            source,
            AttemptStatus::Error,
            None,
            Some(ErrorCode::BudgetExhausted),
            Some("local request budget exhausted".to_string()),
            None,
            false,
        )
    }

    /// Record a provider that does not exist in this engine.
    pub fn record_unknown_source(&mut self, source: &ProviderId) -> &AttemptRecord {
        self.push(
            source,
            AttemptStatus::Unavailable,
            None,
            Some(ErrorCode::SourceUnavailable),
            Some(format!("unsupported source: {}", source)),
            None,
            false,
        )
    }

    /// Record a provider short-circuited before any call because its
    /// credentials are missing or invalid.
    pub fn record_unconfigured(&mut self, source: &ProviderId, reason: &str) -> &AttemptRecord {
        self.push(
            source,
            AttemptStatus::Unavailable,
            None,
            Some(ErrorCode::InvalidConfig),
            Some(reason.to_string()),
            None,
            false,
        )
    }

    /// Record a provider call abandoned in flight because of cancellation.
    pub fn record_cancelled(&mut self, source: &ProviderId, reason: &str) -> &AttemptRecord {
        self.push(
            source,
            AttemptStatus::Cancelled,
            None,
            Some(ErrorCode::Cancelled),
            Some(reason.to_string()),
            None,
            true,
        )
    }

    /// Record a provider whose health probe was cut short by cancellation.
    /// Same wire shape as [`record_cancelled`](Self::record_cancelled), but
    /// the provider itself was never called.
    pub fn record_cancelled_while_probing(&mut self, source: &ProviderId, reason: &str) -> &AttemptRecord {
        self.push(
            source,
            AttemptStatus::Cancelled,
            None,
            Some(ErrorCode::Cancelled),
            Some(reason.to_string()),
            None,
            false,
        )
    }

    pub fn records(&self) -> &[AttemptRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of successful records.
    pub fn successes(&self) -> usize {
        self.records.iter().filter(|r| r.is_success()).count()
    }

    pub fn first_success(&self) -> Option<&AttemptRecord> {
        self.records.iter().find(|r| r.is_success())
    }

    pub fn into_records(self) -> Vec<AttemptRecord> {
        self.records
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Terminal state of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalState {
    Resolved,
    Exhausted,
    Cancelled,
}

/// What the engine hands back to its caller.
///
/// `chosen` is `None` exactly when no record has status `success`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcquisitionResult<T> {
    pub chosen: Option<ProviderId>,
    pub items: Vec<T>,
    pub attempts: Vec<AttemptRecord>,
    pub trace_id: String,
    pub state: FinalState,
}

impl<T> AcquisitionResult<T> {
    /// A result resolved by `provider`, which must own a success record.
    pub fn resolved(provider: ProviderId, items: Vec<T>, ledger: AttemptLedger, trace_id: String) -> Self {
        debug_assert!(ledger
            .records()
            .iter()
            .any(|r| r.is_success() && r.source == provider));
        Self {
            chosen: Some(provider),
            items,
            attempts: ledger.into_records(),
            trace_id,
            state: FinalState::Resolved,
        }
    }

    /// Every tier was walked without a success.
    pub fn exhausted(ledger: AttemptLedger, trace_id: String) -> Self {
        Self {
            chosen: None,
            items: Vec::new(),
            attempts: ledger.into_records(),
            trace_id,
            state: FinalState::Exhausted,
        }
    }

    /// The caller cancelled before any success.
    pub fn cancelled(ledger: AttemptLedger, trace_id: String) -> Self {
        Self {
            chosen: None,
            items: Vec::new(),
            attempts: ledger.into_records(),
            trace_id,
            state: FinalState::Cancelled,
        }
    }

    /// True when nothing was obtained.
    pub fn is_degraded(&self) -> bool {
        self.chosen.is_none()
    }
}
