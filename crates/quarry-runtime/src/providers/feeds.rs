//! RSS/Atom trend feeds as a keyword source.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use quarry_core::{
    AcquisitionRequest, Capability, Category, Outcome, ProbeSample, ProviderConfig,
    ProviderDescriptor, TopicKeyword,
};

use super::http::{self, HttpSettings, BROWSER_USER_AGENT};
use super::markup;
use super::{Provider, ProviderError, ProviderFactory};

/// Headlines from one feed become topic keywords.
///
/// The first `<title>` of a feed names the channel itself and is skipped.
#[derive(Debug)]
pub struct TrendFeedProvider {
    descriptor: ProviderDescriptor,
    feed_url: String,
    category: Option<Category>,
    health_url: Option<String>,
    client: reqwest::Client,
}

impl TrendFeedProvider {
    pub fn new(
        descriptor: ProviderDescriptor,
        feed_url: impl Into<String>,
        category: Option<Category>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            descriptor,
            feed_url: feed_url.into(),
            category,
            health_url: None,
            client,
        }
    }

    pub fn with_health_url(mut self, url: impl Into<String>) -> Self {
        self.health_url = Some(url.into());
        self
    }

    async fn fetch(&self, request: &AcquisitionRequest) -> Result<Vec<TopicKeyword>, ProviderError> {
        let document = http::get_text(
            self.client
                .get(&self.feed_url)
                .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT),
        )
        .await?;

        let category = request.category.or(self.category);
        Ok(markup::titles(&document)
            .into_iter()
            .skip(1)
            .take(request.limit as usize)
            .map(|keyword| TopicKeyword {
                keyword,
                category,
                source: self.descriptor.id.clone(),
                fallback: false,
            })
            .collect())
    }
}

#[async_trait]
impl Provider for TrendFeedProvider {
    type Item = TopicKeyword;

    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn attempt(&self, request: &AcquisitionRequest) -> Outcome<TopicKeyword> {
        match self.fetch(request).await {
            Ok(keywords) => Outcome::Success(keywords).normalize(),
            Err(e) => e.into_outcome(),
        }
    }

    async fn health_check(&self, timeout: Duration) -> Option<ProbeSample> {
        let url = self.health_url.as_deref().unwrap_or(&self.feed_url);
        Some(http::probe(&self.client, url, timeout).await)
    }
}

pub struct TrendFeedFactory;

impl ProviderFactory<TopicKeyword> for TrendFeedFactory {
    fn kind(&self) -> &'static str {
        "trend_feed"
    }

    fn capability(&self) -> Capability {
        Capability::Keywords
    }

    fn validate_config(&self, config: &ProviderConfig) -> Result<(), ProviderError> {
        if config.capability != Capability::Keywords {
            return Err(ProviderError::NotConfigured(format!(
                "provider '{}': trend_feed yields keywords, not {}",
                config.name, config.capability
            )));
        }
        if config.endpoint.is_none() {
            return Err(ProviderError::NotConfigured(format!(
                "provider '{}': trend_feed needs an endpoint",
                config.name
            )));
        }
        Ok(())
    }

    fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider<Item = TopicKeyword>>, ProviderError> {
        let feed_url = config.endpoint.as_deref().ok_or_else(|| {
            ProviderError::NotConfigured(format!("provider '{}': trend_feed needs an endpoint", config.name))
        })?;
        let descriptor = ProviderDescriptor::credential_free(config.name.as_str(), config.tier, config.capability);
        let mut provider = TrendFeedProvider::new(
            descriptor,
            feed_url,
            config.category,
            HttpSettings::default().build_client()?,
        );
        if let Some(url) = &config.health_endpoint {
            provider = provider.with_health_url(url);
        }
        Ok(Arc::new(provider))
    }

    fn description(&self) -> &'static str {
        "RSS/Atom headlines as trend keywords"
    }
}
