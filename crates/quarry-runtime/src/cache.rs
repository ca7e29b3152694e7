//! Health snapshot cache.
//!
//! Probing a vendor costs a network round trip, so snapshots are kept for
//! their TTL and shared by every request in the process.

use moka::future::Cache;
use std::time::Duration;

use quarry_core::{HealthSnapshot, ProviderId};

/// Snapshots keyed by provider, expired by moka after `ttl`.
#[derive(Clone)]
pub struct HealthCache {
    cache: Cache<ProviderId, HealthSnapshot>,
}

impl HealthCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    /// A snapshot that is still inside its own TTL.
    pub async fn get_fresh(&self, provider: &ProviderId) -> Option<HealthSnapshot> {
        self.cache
            .get(provider)
            .await
            .filter(|snapshot| snapshot.is_fresh())
    }

    pub async fn insert(&self, snapshot: HealthSnapshot) {
        self.cache.insert(snapshot.provider.clone(), snapshot).await;
    }

    pub async fn invalidate(&self, provider: &ProviderId) {
        self.cache.invalidate(provider).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for HealthCache {
    fn default() -> Self {
        Self::new(1_000, Duration::from_secs(300))
    }
}

impl std::fmt::Debug for HealthCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::ProbeSample;

    #[tokio::test]
    async fn test_cache_round_trip_and_invalidate() {
        let cache = HealthCache::default();
        let pexels = ProviderId::new("pexels");
        let snapshot = HealthSnapshot::from_sample(
            pexels.clone(),
            &ProbeSample::responded(200, Duration::from_millis(50)),
            Duration::from_secs(300),
        );

        cache.insert(snapshot.clone()).await;
        assert_eq!(cache.get_fresh(&pexels).await, Some(snapshot));

        cache.invalidate(&pexels).await;
        assert_eq!(cache.get_fresh(&pexels).await, None);
    }

    #[tokio::test]
    async fn test_expired_snapshot_is_not_returned() {
        let cache = HealthCache::default();
        let pexels = ProviderId::new("pexels");
        // zero ttl: stale the moment it is measured
        let snapshot = HealthSnapshot::from_sample(
            pexels.clone(),
            &ProbeSample::responded(200, Duration::from_millis(50)),
            Duration::ZERO,
        );
        cache.insert(snapshot).await;
        assert_eq!(cache.get_fresh(&pexels).await, None);
    }
}
