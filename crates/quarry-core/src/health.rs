//! Health scoring.
//!
//! Scores are advisory: they let the orchestrator skip providers that are
//! clearly down before spending a real, quota-consuming attempt. Probing
//! itself happens in the runtime; this module only turns a probe sample
//! into a score.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::{ProviderId, Tier};

/// Weight of "status was exactly 200"
const WEIGHT_OK: f64 = 0.4;
/// Weight of the latency factor
const WEIGHT_LATENCY: f64 = 0.3;
/// Weight of "status below 400"
const WEIGHT_NOT_ERROR: f64 = 0.2;
/// Freshness weight; always earned
const WEIGHT_FRESHNESS: f64 = 0.1;

const FAST_LATENCY: Duration = Duration::from_secs(3);
const SLOW_LATENCY: Duration = Duration::from_secs(5);

/// What a single probe observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSample {
    /// HTTP status, `None` if the probe never got a response
    pub status: Option<u16>,
    pub latency: Duration,
}

impl ProbeSample {
    pub fn responded(status: u16, latency: Duration) -> Self {
        Self {
            status: Some(status),
            latency,
        }
    }

    pub fn unreachable(latency: Duration) -> Self {
        Self {
            status: None,
            latency,
        }
    }
}

/// Score a probe sample into `[0, 1]`.
///
/// An unreachable provider scores 0.
pub fn score(sample: &ProbeSample) -> f64 {
    let Some(status) = sample.status else {
        return 0.0;
    };

    let latency_factor = if sample.latency < FAST_LATENCY {
        1.0
    } else if sample.latency < SLOW_LATENCY {
        0.5
    } else {
        0.0
    };

    let mut total = WEIGHT_FRESHNESS + WEIGHT_LATENCY * latency_factor;
    if status == 200 {
        total += WEIGHT_OK;
    }
    if status < 400 {
        total += WEIGHT_NOT_ERROR;
    }
    total.clamp(0.0, 1.0)
}

/// Coarse health band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthBand {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthBand {
    pub fn from_score(score: f64) -> Self {
        if score > 0.7 {
            HealthBand::Healthy
        } else if score >= 0.4 {
            HealthBand::Degraded
        } else {
            HealthBand::Unhealthy
        }
    }
}

/// A cached health measurement for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub provider: ProviderId,
    pub score: f64,
    pub band: HealthBand,
    pub measured_at: DateTime<Utc>,

    #[serde(with = "crate::config::duration")]
    pub ttl: Duration,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    pub latency_ms: u64,
}

impl HealthSnapshot {
    pub fn from_sample(provider: ProviderId, sample: &ProbeSample, ttl: Duration) -> Self {
        let score = score(sample);
        Self {
            provider,
            score,
            band: HealthBand::from_score(score),
            measured_at: Utc::now(),
            ttl,
            status_code: sample.status,
            latency_ms: sample.latency.as_millis() as u64,
        }
    }

    /// Snapshot for providers that expose no probe: assumed healthy.
    pub fn assumed_healthy(provider: ProviderId) -> Self {
        Self {
            provider,
            score: 1.0,
            band: HealthBand::Healthy,
            measured_at: Utc::now(),
            ttl: Duration::ZERO,
            status_code: None,
            latency_ms: 0,
        }
    }

    /// True while `now` is inside the TTL window.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => now < self.measured_at + ttl,
            Err(_) => true,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }
}

/// Minimum score a provider needs before it is attempted, per tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub primary: f64,
    pub backup: f64,
    pub last_resort: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            primary: 0.6,
            backup: 0.4,
            last_resort: 0.0,
        }
    }
}

impl TierThresholds {
    pub fn for_tier(&self, tier: Tier) -> f64 {
        match tier {
            Tier::Primary => self.primary,
            Tier::Backup => self.backup,
            Tier::LastResort => self.last_resort,
        }
    }

    /// Whether a score clears the tier's bar.
    pub fn admits(&self, tier: Tier, score: f64) -> bool {
        score >= self.for_tier(tier)
    }
}
