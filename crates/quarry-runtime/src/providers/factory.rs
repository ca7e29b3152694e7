//! Provider factories keyed by adapter kind.
//!
//! A config entry names an adapter `kind` (`pexels`, `trend_feed`, ...);
//! the registry finds the factory for that kind and builds the provider.
//! New adapters are added by registering a factory, not by editing an enum.
//!
//! ```ignore
//! let registry = ProviderRegistry::<ImageItem>::images();
//! let orchestrator = registry.build_orchestrator(&config, Capability::Images, None)?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use quarry_core::{
    Capability, Category, EngineConfig, ImageItem, ProviderConfig, SourceSnippet, TopicKeyword,
};

use super::{ApiCredential, Provider, ProviderError, Unconfigured};
use crate::orchestrator::{FallbackOrchestrator, OrchestratorPolicy, RuntimeError};
use crate::resilience::{BudgetTracker, HealthProber};

/// Builds providers of one kind from their config entry.
pub trait ProviderFactory<T: Send + 'static>: Send + Sync {
    /// The `kind` string this factory answers to.
    fn kind(&self) -> &'static str;

    fn capability(&self) -> Capability;

    /// Build a provider.
    ///
    /// A missing credential is not an error here: factories return an
    /// [`Unconfigured`] placeholder so the gap shows up in attempt records.
    fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider<Item = T>>, ProviderError>;

    /// Check a config entry without building anything.
    fn validate_config(&self, config: &ProviderConfig) -> Result<(), ProviderError> {
        if config.capability != self.capability() {
            return Err(ProviderError::NotConfigured(format!(
                "provider '{}': kind '{}' yields {}, not {}",
                config.name,
                self.kind(),
                self.capability(),
                config.capability
            )));
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Content provider"
    }
}

/// Load the credential a config entry points at, falling back to the
/// adapter's conventional variable.
pub(crate) fn credential_for(
    config: &ProviderConfig,
    default_env: &str,
    name: &'static str,
) -> Result<ApiCredential, ProviderError> {
    let env_var = config.credential_env.as_deref().unwrap_or(default_env);
    ApiCredential::from_env(env_var, name)
}

/// Placeholder for a provider that could not load its credential.
pub(crate) fn unconfigured<T: Send + 'static>(
    config: &ProviderConfig,
    error: ProviderError,
) -> Arc<dyn Provider<Item = T>> {
    let reason = match error {
        ProviderError::NotConfigured(reason) => reason,
        other => other.to_string(),
    };
    tracing::info!(provider = %config.name, reason = %reason, "provider unconfigured");
    Arc::new(Unconfigured::new(
        config.name.as_str(),
        config.tier,
        config.capability,
        reason,
    ))
}

/// Registry of provider factories for one item type.
pub struct ProviderRegistry<T: Send + 'static> {
    factories: BTreeMap<String, Arc<dyn ProviderFactory<T>>>,
}

impl<T: Send + 'static> Default for ProviderRegistry<T> {
    fn default() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }
}

impl<T: Send + 'static> ProviderRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any factory of the same kind.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory<T>>) {
        self.factories.insert(factory.kind().to_string(), factory);
    }

    pub fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider<Item = T>>, ProviderError> {
        let factory = self.factory(&config.kind)?;
        factory.validate_config(config)?;
        factory.create(config)
    }

    pub fn validate(&self, config: &ProviderConfig) -> Result<(), ProviderError> {
        self.factory(&config.kind)?.validate_config(config)
    }

    fn factory(&self, kind: &str) -> Result<&Arc<dyn ProviderFactory<T>>, ProviderError> {
        self.factories.get(kind).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "Unknown provider kind: '{}'. Available: {:?}",
                kind,
                self.available_kinds()
            ))
        })
    }

    pub fn available_kinds(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    pub fn has_kind(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Build every provider in `config` with `capability` (and serving
    /// `category`, when given) into an orchestrator.
    pub fn build_orchestrator(
        &self,
        config: &EngineConfig,
        capability: Capability,
        category: Option<Category>,
    ) -> Result<FallbackOrchestrator<T>, RuntimeError> {
        self.build_orchestrator_with(
            config,
            capability,
            category,
            HealthProber::from_config(&config.health),
            BudgetTracker::new(),
        )
    }

    /// Like [`build_orchestrator`](Self::build_orchestrator), sharing
    /// `prober` (and its snapshot cache) and `budgets` with other
    /// orchestrators. A provider that several orchestrators carry is then
    /// probed once per TTL and charged against one budget window.
    pub fn build_orchestrator_with(
        &self,
        config: &EngineConfig,
        capability: Capability,
        category: Option<Category>,
        prober: HealthProber,
        budgets: BudgetTracker,
    ) -> Result<FallbackOrchestrator<T>, RuntimeError> {
        let mut builder = FallbackOrchestrator::builder()
            .policy(OrchestratorPolicy::from_config(config))
            .prober(prober)
            .budgets(budgets);

        for entry in config.providers_serving(capability, category) {
            let provider = self
                .create(entry)
                .map_err(|e| RuntimeError::Build(format!("provider '{}': {}", entry.name, e)))?;
            builder = builder.provider(provider);
            if let Some(budget) = &entry.budget {
                builder = builder.budget(entry.name.as_str(), budget.max_requests, budget.window);
            }
        }

        builder.build()
    }
}

impl ProviderRegistry<ImageItem> {
    /// Registry with the built-in image adapters.
    pub fn images() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "http")]
        {
            registry.register(Arc::new(super::UnsplashFactory));
            registry.register(Arc::new(super::PexelsFactory));
            registry.register(Arc::new(super::PixabayFactory));
            registry.register(Arc::new(super::GoogleImagesFactory));
            registry.register(Arc::new(super::DuckDuckGoFactory));
        }
        registry
    }
}

impl ProviderRegistry<TopicKeyword> {
    /// Registry with the built-in keyword sources.
    pub fn keywords() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::KeywordLibraryFactory));
        #[cfg(feature = "http")]
        registry.register(Arc::new(super::TrendFeedFactory));
        registry
    }
}

impl ProviderRegistry<SourceSnippet> {
    /// Registry with the built-in snippet sources.
    pub fn snippets() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "http")]
        registry.register(Arc::new(super::PageSnippetFactory));
        registry
    }
}

impl<T: Send + 'static> std::fmt::Debug for ProviderRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("kinds", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
