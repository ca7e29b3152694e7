use async_trait::async_trait;
use std::marker::PhantomData;

use quarry_core::{AcquisitionRequest, Capability, Outcome, ProviderDescriptor, ProviderId, Tier};

use super::Provider;

/// Stand-in for a provider whose credential is missing.
///
/// Its descriptor reports `credentials_present = false`, so the orchestrator
/// records it as `unavailable` without calling it. Calling it anyway
/// returns the configuration error; it never touches the network.
pub struct Unconfigured<T> {
    descriptor: ProviderDescriptor,
    reason: String,
    _item: PhantomData<fn() -> T>,
}

impl<T> Unconfigured<T> {
    pub fn new(
        id: impl Into<ProviderId>,
        tier: Tier,
        capability: Capability,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            descriptor: ProviderDescriptor::with_credentials(id, tier, capability, false),
            reason: reason.into(),
            _item: PhantomData,
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl<T> std::fmt::Debug for Unconfigured<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unconfigured")
            .field("descriptor", &self.descriptor)
            .field("reason", &self.reason)
            .finish()
    }
}

#[async_trait]
impl<T: Send + 'static> Provider for Unconfigured<T> {
    type Item = T;

    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn attempt(&self, _request: &AcquisitionRequest) -> Outcome<T> {
        Outcome::ConfigError(self.reason.clone())
    }

    fn unavailable_reason(&self) -> Option<&str> {
        Some(&self.reason)
    }
}
