//! Provider health probing through the snapshot cache.

use std::time::Duration;

use quarry_core::{HealthConfig, HealthSnapshot, ProbeSample};

use crate::cache::HealthCache;
use crate::providers::Provider;

/// Cached, timeout-bounded health probes.
///
/// Concurrent requests may both miss the cache and probe the same provider;
/// the later snapshot simply replaces the earlier one. Only probes that got
/// a response are cached, so a transient network failure does not keep a
/// provider skipped for a whole TTL.
#[derive(Debug, Clone)]
pub struct HealthProber {
    cache: HealthCache,
    probe_timeout: Duration,
    ttl: Duration,
    enabled: bool,
}

impl HealthProber {
    pub fn new(probe_timeout: Duration, ttl: Duration) -> Self {
        Self {
            cache: HealthCache::new(1_000, ttl.max(Duration::from_millis(1))),
            probe_timeout,
            ttl,
            enabled: true,
        }
    }

    pub fn from_config(config: &HealthConfig) -> Self {
        let mut prober = Self::new(config.probe_timeout, config.ttl);
        prober.enabled = config.enabled;
        prober
    }

    /// A prober that reports every provider healthy without probing.
    pub fn disabled() -> Self {
        let mut prober = Self::new(Duration::from_secs(5), Duration::from_secs(300));
        prober.enabled = false;
        prober
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn cache(&self) -> &HealthCache {
        &self.cache
    }

    /// Current health of `provider`, probing only when the cached snapshot
    /// is missing or stale.
    pub async fn snapshot<P>(&self, provider: &P) -> HealthSnapshot
    where
        P: Provider + ?Sized,
    {
        let id = provider.descriptor().id.clone();
        if !self.enabled {
            return HealthSnapshot::assumed_healthy(id);
        }

        if let Some(snapshot) = self.cache.get_fresh(&id).await {
            tracing::trace!(provider = %id, score = snapshot.score, "health cache hit");
            return snapshot;
        }

        let sample = match tokio::time::timeout(self.probe_timeout, provider.health_check(self.probe_timeout)).await {
            Ok(Some(sample)) => sample,
            Ok(None) => return HealthSnapshot::assumed_healthy(id),
            Err(_) => ProbeSample::unreachable(self.probe_timeout),
        };

        let snapshot = HealthSnapshot::from_sample(id, &sample, self.ttl);
        tracing::debug!(
            provider = %snapshot.provider,
            score = snapshot.score,
            band = ?snapshot.band,
            latency_ms = snapshot.latency_ms,
            "health probed"
        );
        // a probe that got no response is not cached; the next request probes again
        if sample.status.is_some() {
            self.cache.insert(snapshot.clone()).await;
        }
        snapshot
    }
}

impl Default for HealthProber {
    fn default() -> Self {
        Self::from_config(&HealthConfig::default())
    }
}
