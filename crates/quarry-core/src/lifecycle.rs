//! Per-request state machine.
//!
//! ```text
//! Pending -> { per provider: Probing -> Attempting -> Succeeded | Skipped | Failed }
//!         -> Resolved(chosen) | Exhausted | Cancelled
//! ```
//!
//! The orchestrator drives one [`RequestLifecycle`] per acquisition. Illegal
//! transitions are orchestrator defects and surface as [`LifecycleError`].

use std::collections::HashMap;
use thiserror::Error;

use crate::outcome::ErrorCode;
use crate::types::ProviderId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LifecycleError {
    #[error("provider '{0}' was already probed in this request")]
    AlreadyProbed(ProviderId),

    #[error("provider '{provider}' cannot move from {from:?} to {to}")]
    IllegalTransition {
        provider: ProviderId,
        from: Option<ProviderState>,
        to: &'static str,
    },

    #[error("request already finished as {0:?}")]
    AlreadyFinished(RequestState),
}

/// Where one provider stands within a request.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderState {
    Probing,
    Attempting,
    Succeeded,
    Skipped,
    Failed(ErrorCode),
    Cancelled,
}

impl ProviderState {
    fn is_terminal(&self) -> bool {
        !matches!(self, ProviderState::Probing | ProviderState::Attempting)
    }
}

/// Where the whole request stands.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestState {
    Pending,
    Running,
    Resolved(ProviderId),
    Exhausted,
    Cancelled,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Resolved(_) | RequestState::Exhausted | RequestState::Cancelled
        )
    }
}

#[derive(Debug)]
pub struct RequestLifecycle {
    state: RequestState,
    providers: HashMap<ProviderId, ProviderState>,
}

impl Default for RequestLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestLifecycle {
    pub fn new() -> Self {
        Self {
            state: RequestState::Pending,
            providers: HashMap::new(),
        }
    }

    pub fn state(&self) -> &RequestState {
        &self.state
    }

    pub fn provider_state(&self, provider: &ProviderId) -> Option<&ProviderState> {
        self.providers.get(provider)
    }

    fn ensure_open(&mut self) -> Result<(), LifecycleError> {
        if self.state.is_terminal() {
            return Err(LifecycleError::AlreadyFinished(self.state.clone()));
        }
        self.state = RequestState::Running;
        Ok(())
    }

    /// Enter `Probing`. A provider enters it at most once per request.
    pub fn begin_probe(&mut self, provider: &ProviderId) -> Result<(), LifecycleError> {
        self.ensure_open()?;
        if self.providers.contains_key(provider) {
            return Err(LifecycleError::AlreadyProbed(provider.clone()));
        }
        self.providers.insert(provider.clone(), ProviderState::Probing);
        Ok(())
    }

    /// Move from `Probing` to `Attempting`.
    pub fn begin_attempt(&mut self, provider: &ProviderId) -> Result<(), LifecycleError> {
        self.ensure_open()?;
        self.transition(provider, "Attempting", |from| {
            matches!(from, Some(ProviderState::Probing))
        })?;
        self.providers.insert(provider.clone(), ProviderState::Attempting);
        Ok(())
    }

    /// Close a provider without an attempt (unhealthy, unconfigured, budget).
    pub fn skip(&mut self, provider: &ProviderId) -> Result<(), LifecycleError> {
        self.ensure_open()?;
        self.transition(provider, "Skipped", |from| {
            matches!(from, None | Some(ProviderState::Probing))
        })?;
        self.providers.insert(provider.clone(), ProviderState::Skipped);
        Ok(())
    }

    /// Record how an attempt ended. `None` means it succeeded.
    pub fn finish_attempt(
        &mut self,
        provider: &ProviderId,
        failure: Option<ErrorCode>,
    ) -> Result<(), LifecycleError> {
        self.ensure_open()?;
        self.transition(provider, "finished", |from| {
            matches!(from, Some(ProviderState::Attempting))
        })?;
        let next = match failure {
            None => ProviderState::Succeeded,
            Some(ErrorCode::Cancelled) => ProviderState::Cancelled,
            Some(code) => ProviderState::Failed(code),
        };
        self.providers.insert(provider.clone(), next);
        Ok(())
    }

    pub fn resolve(&mut self, chosen: &ProviderId) -> Result<(), LifecycleError> {
        if self.state.is_terminal() {
            return Err(LifecycleError::AlreadyFinished(self.state.clone()));
        }
        if self.providers.get(chosen) != Some(&ProviderState::Succeeded) {
            return Err(LifecycleError::IllegalTransition {
                provider: chosen.clone(),
                from: self.providers.get(chosen).cloned(),
                to: "Resolved",
            });
        }
        self.state = RequestState::Resolved(chosen.clone());
        Ok(())
    }

    pub fn exhaust(&mut self) -> Result<(), LifecycleError> {
        if self.state.is_terminal() {
            return Err(LifecycleError::AlreadyFinished(self.state.clone()));
        }
        self.state = RequestState::Exhausted;
        Ok(())
    }

    /// Cancel the request; any provider still in flight becomes `Cancelled`.
    pub fn cancel(&mut self) -> Result<(), LifecycleError> {
        if self.state.is_terminal() {
            return Err(LifecycleError::AlreadyFinished(self.state.clone()));
        }
        for state in self.providers.values_mut() {
            if !state.is_terminal() {
                *state = ProviderState::Cancelled;
            }
        }
        self.state = RequestState::Cancelled;
        Ok(())
    }

    fn transition(
        &self,
        provider: &ProviderId,
        to: &'static str,
        allowed: impl Fn(Option<&ProviderState>) -> bool,
    ) -> Result<(), LifecycleError> {
        let from = self.providers.get(provider);
        if allowed(from) {
            Ok(())
        } else {
            Err(LifecycleError::IllegalTransition {
                provider: provider.clone(),
                from: from.cloned(),
                to,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_resolves() {
        let a = ProviderId::new("a");
        let mut lifecycle = RequestLifecycle::new();
        assert_eq!(lifecycle.state(), &RequestState::Pending);

        lifecycle.begin_probe(&a).unwrap();
        lifecycle.begin_attempt(&a).unwrap();
        lifecycle.finish_attempt(&a, None).unwrap();
        lifecycle.resolve(&a).unwrap();

        assert_eq!(lifecycle.state(), &RequestState::Resolved(a.clone()));
        assert_eq!(lifecycle.provider_state(&a), Some(&ProviderState::Succeeded));
    }

    #[test]
    fn test_provider_cannot_be_probed_twice() {
        let a = ProviderId::new("a");
        let mut lifecycle = RequestLifecycle::new();
        lifecycle.begin_probe(&a).unwrap();
        lifecycle.skip(&a).unwrap();
        assert_eq!(
            lifecycle.begin_probe(&a),
            Err(LifecycleError::AlreadyProbed(a.clone()))
        );
    }

    #[test]
    fn test_cannot_resolve_to_failed_provider() {
        let a = ProviderId::new("a");
        let mut lifecycle = RequestLifecycle::new();
        lifecycle.begin_probe(&a).unwrap();
        lifecycle.begin_attempt(&a).unwrap();
        lifecycle
            .finish_attempt(&a, Some(ErrorCode::RateLimit))
            .unwrap();
        assert!(lifecycle.resolve(&a).is_err());
        lifecycle.exhaust().unwrap();
        assert!(lifecycle.exhaust().is_err());
    }

    #[test]
    fn test_cancel_marks_in_flight_providers() {
        let a = ProviderId::new("a");
        let mut lifecycle = RequestLifecycle::new();
        lifecycle.begin_probe(&a).unwrap();
        lifecycle.begin_attempt(&a).unwrap();
        lifecycle.cancel().unwrap();
        assert_eq!(lifecycle.provider_state(&a), Some(&ProviderState::Cancelled));
        assert_eq!(lifecycle.state(), &RequestState::Cancelled);
    }
}
