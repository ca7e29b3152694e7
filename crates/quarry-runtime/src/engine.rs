//! One engine per configuration: an orchestrator per capability.
//!
//! Keyword sources are topical, so keywords get one orchestrator per
//! category plus an uncategorised one. Every orchestrator shares the same
//! health prober, so a vendor probed for one capability is not probed again
//! for another within the TTL. They also share one budget tracker: a source
//! that serves several categories still has a single request window.

use serde::Serialize;
use std::collections::HashMap;

use quarry_core::{
    AcquisitionRequest, AcquisitionResult, Capability, Category, ConsistencyValidator, EngineConfig,
    ImageItem, SourceSnippet, TopicKeyword,
};

use crate::context::RequestContext;
use crate::orchestrator::{CorroboratedResult, FallbackOrchestrator, HealthEntry, RuntimeError};
use crate::providers::ProviderRegistry;
use crate::resilience::{BudgetTracker, HealthProber};

/// Health of every configured provider, grouped by capability.
#[derive(Debug, Clone, Serialize)]
pub struct EngineHealth {
    pub images: Vec<HealthEntry>,
    pub keywords: Vec<HealthEntry>,
    pub snippets: Vec<HealthEntry>,
}

pub struct Engine {
    config: EngineConfig,
    prober: HealthProber,
    budgets: BudgetTracker,
    validator: ConsistencyValidator,
    images: FallbackOrchestrator<ImageItem>,
    keywords: HashMap<Option<Category>, FallbackOrchestrator<TopicKeyword>>,
    snippets: FallbackOrchestrator<SourceSnippet>,
}

impl Engine {
    /// Build every orchestrator `config` describes, using the built-in adapters.
    pub fn from_config(config: EngineConfig) -> Result<Self, RuntimeError> {
        Self::with_registries(
            config,
            &ProviderRegistry::images(),
            &ProviderRegistry::keywords(),
            &ProviderRegistry::snippets(),
        )
    }

    /// Build with caller-supplied registries (extra adapter kinds).
    pub fn with_registries(
        config: EngineConfig,
        images: &ProviderRegistry<ImageItem>,
        keywords: &ProviderRegistry<TopicKeyword>,
        snippets: &ProviderRegistry<SourceSnippet>,
    ) -> Result<Self, RuntimeError> {
        let prober = HealthProber::from_config(&config.health);
        let budgets = BudgetTracker::new();
        let validator = ConsistencyValidator::from_config(&config.consistency);

        let image_orchestrator = images.build_orchestrator_with(
            &config,
            Capability::Images,
            None,
            prober.clone(),
            budgets.clone(),
        )?;
        let snippet_orchestrator = snippets.build_orchestrator_with(
            &config,
            Capability::Snippets,
            None,
            prober.clone(),
            budgets.clone(),
        )?;

        let mut keyword_orchestrators = HashMap::new();
        for category in std::iter::once(None).chain(Category::ALL.into_iter().map(Some)) {
            let orchestrator = keywords.build_orchestrator_with(
                &config,
                Capability::Keywords,
                category,
                prober.clone(),
                budgets.clone(),
            )?;
            keyword_orchestrators.insert(category, orchestrator);
        }

        tracing::info!(
            providers = config.providers.len(),
            mode = ?config.mode,
            health_checks = prober.is_enabled(),
            "engine ready"
        );

        Ok(Self {
            config,
            prober,
            budgets,
            validator,
            images: image_orchestrator,
            keywords: keyword_orchestrators,
            snippets: snippet_orchestrator,
        })
    }

    /// Engine over the built-in provider chain.
    pub fn builtin() -> Result<Self, RuntimeError> {
        Self::from_config(EngineConfig::builtin()?)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn prober(&self) -> &HealthProber {
        &self.prober
    }

    pub fn budgets(&self) -> &BudgetTracker {
        &self.budgets
    }

    pub fn validator(&self) -> &ConsistencyValidator {
        &self.validator
    }

    pub fn image_orchestrator(&self) -> &FallbackOrchestrator<ImageItem> {
        &self.images
    }

    pub fn snippet_orchestrator(&self) -> &FallbackOrchestrator<SourceSnippet> {
        &self.snippets
    }

    fn keyword_orchestrator(&self, category: Option<Category>) -> Result<&FallbackOrchestrator<TopicKeyword>, RuntimeError> {
        self.keywords
            .get(&category)
            .ok_or_else(|| RuntimeError::Build(format!("no keyword orchestrator for {:?}", category)))
    }

    pub async fn images(
        &self,
        request: &AcquisitionRequest,
        ctx: &RequestContext,
    ) -> Result<AcquisitionResult<ImageItem>, RuntimeError> {
        self.images.acquire(request, ctx).await
    }

    /// Trending keywords from the sources serving `request.category`.
    pub async fn keywords(
        &self,
        request: &AcquisitionRequest,
        ctx: &RequestContext,
    ) -> Result<AcquisitionResult<TopicKeyword>, RuntimeError> {
        self.keyword_orchestrator(request.category)?
            .acquire(request, ctx)
            .await
    }

    pub async fn snippets(
        &self,
        request: &AcquisitionRequest,
        ctx: &RequestContext,
    ) -> Result<AcquisitionResult<SourceSnippet>, RuntimeError> {
        self.snippets.acquire(request, ctx).await
    }

    /// Gather snippets about `request.query` and judge whether the sources agree.
    pub async fn corroborate(
        &self,
        request: &AcquisitionRequest,
        ctx: &RequestContext,
    ) -> Result<CorroboratedResult<SourceSnippet>, RuntimeError> {
        self.snippets
            .acquire_corroborated(request, ctx, &self.validator)
            .await
    }

    pub async fn health_report(&self) -> Result<EngineHealth, RuntimeError> {
        Ok(EngineHealth {
            images: self.images.health_report().await,
            keywords: self.keyword_orchestrator(None)?.health_report().await,
            snippets: self.snippets.health_report().await,
        })
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("images", &self.images)
            .field("snippets", &self.snippets)
            .field("keyword_categories", &self.keywords.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::{ErrorCode, ProviderConfig, Tier};
    use std::time::Duration;

    fn library_only() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.health.enabled = false;
        config.providers.push(ProviderConfig::new(
            "keyword-library",
            "keyword_library",
            Tier::LastResort,
            Capability::Keywords,
        ));
        config
    }

    #[tokio::test]
    async fn test_keywords_fall_back_to_library() {
        let engine = Engine::from_config(library_only()).unwrap();
        let request = AcquisitionRequest::new("").with_category(Category::Food);

        let result = engine.keywords(&request, &RequestContext::new()).await.unwrap();
        assert_eq!(result.chosen.as_ref().map(|c| c.as_str()), Some("keyword-library"));
        assert!(result.items.iter().all(|k| k.fallback));
        assert!(result.items.iter().all(|k| k.category == Some(Category::Food)));
    }

    #[tokio::test]
    async fn test_engine_without_image_providers_is_exhausted() {
        let engine = Engine::from_config(library_only()).unwrap();
        let result = engine
            .images(&AcquisitionRequest::new("cats"), &RequestContext::new())
            .await
            .unwrap();
        assert!(result.is_degraded());
        assert!(result.attempts.is_empty());
    }

    #[tokio::test]
    async fn test_health_report_lists_keyword_sources() {
        let engine = Engine::from_config(library_only()).unwrap();
        let report = engine.health_report().await.unwrap();
        assert!(report.images.is_empty());
        assert_eq!(report.keywords.len(), 1);
        assert!(report.keywords[0].ready);
    }

    #[tokio::test]
    async fn test_keyword_budget_is_shared_across_categories() {
        let mut config = library_only();
        config.providers[0] = config.providers[0]
            .clone()
            .with_budget(1, Duration::from_secs(3600));
        let engine = Engine::from_config(config).unwrap();
        let ctx = RequestContext::new();

        let uncategorised = engine.keywords(&AcquisitionRequest::new(""), &ctx).await.unwrap();
        assert_eq!(uncategorised.chosen.as_ref().map(|c| c.as_str()), Some("keyword-library"));

        for category in [Category::Food, Category::Fashion] {
            let request = AcquisitionRequest::new("").with_category(category);
            let result = engine.keywords(&request, &ctx).await.unwrap();
            assert_eq!(result.chosen, None);
            assert_eq!(result.attempts.len(), 1);
            assert_eq!(result.attempts[0].code, Some(ErrorCode::BudgetExhausted));
        }
        assert_eq!(
            engine.budgets().remaining(&quarry_core::ProviderId::new("keyword-library")),
            Some(0)
        );
    }
}
