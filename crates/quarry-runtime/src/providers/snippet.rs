use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use quarry_core::{
    AcquisitionRequest, Capability, Outcome, ProbeSample, ProviderConfig, ProviderDescriptor,
    SourceSnippet,
};

use super::http::{self, HttpSettings, BROWSER_USER_AGENT};
use super::markup;
use super::{Provider, ProviderError, ProviderFactory};

/// Fetches a search or news page for the subject and keeps a text excerpt.
///
/// Used to corroborate factual subjects across independent sources.
#[derive(Debug)]
pub struct PageSnippetProvider {
    descriptor: ProviderDescriptor,
    page_url: String,
    health_url: Option<String>,
    client: reqwest::Client,
}

impl PageSnippetProvider {
    pub fn new(descriptor: ProviderDescriptor, page_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            descriptor,
            page_url: page_url.into(),
            health_url: None,
            client,
        }
    }

    pub fn with_health_url(mut self, url: impl Into<String>) -> Self {
        self.health_url = Some(url.into());
        self
    }

    async fn fetch(&self, request: &AcquisitionRequest) -> Result<Vec<SourceSnippet>, ProviderError> {
        let response = http::send(
            self.client
                .get(&self.page_url)
                .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
                .query(&[("q", request.query.as_str())]),
        )
        .await?;
        let url = response.url().to_string();
        let html = response
            .text()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let text = markup::visible_text(&html);
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let title = markup::titles(&html).into_iter().next();
        Ok(vec![SourceSnippet::new(url, title, &text, self.descriptor.id.clone())])
    }
}

#[async_trait]
impl Provider for PageSnippetProvider {
    type Item = SourceSnippet;

    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn attempt(&self, request: &AcquisitionRequest) -> Outcome<SourceSnippet> {
        match self.fetch(request).await {
            Ok(snippets) => Outcome::Success(snippets).normalize(),
            Err(e) => e.into_outcome(),
        }
    }

    async fn health_check(&self, timeout: Duration) -> Option<ProbeSample> {
        let url = self.health_url.as_deref().unwrap_or(&self.page_url);
        Some(http::probe(&self.client, url, timeout).await)
    }
}

pub struct PageSnippetFactory;

impl ProviderFactory<SourceSnippet> for PageSnippetFactory {
    fn kind(&self) -> &'static str {
        "page_snippet"
    }

    fn capability(&self) -> Capability {
        Capability::Snippets
    }

    fn validate_config(&self, config: &ProviderConfig) -> Result<(), ProviderError> {
        if config.capability != Capability::Snippets {
            return Err(ProviderError::NotConfigured(format!(
                "provider '{}': page_snippet yields snippets, not {}",
                config.name, config.capability
            )));
        }
        if config.endpoint.is_none() {
            return Err(ProviderError::NotConfigured(format!(
                "provider '{}': page_snippet needs an endpoint",
                config.name
            )));
        }
        Ok(())
    }

    fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider<Item = SourceSnippet>>, ProviderError> {
        let page_url = config.endpoint.as_deref().ok_or_else(|| {
            ProviderError::NotConfigured(format!("provider '{}': page_snippet needs an endpoint", config.name))
        })?;
        let descriptor = ProviderDescriptor::credential_free(config.name.as_str(), config.tier, config.capability);
        let mut provider =
            PageSnippetProvider::new(descriptor, page_url, HttpSettings::default().build_client()?);
        if let Some(url) = &config.health_endpoint {
            provider = provider.with_health_url(url);
        }
        Ok(Arc::new(provider))
    }

    fn description(&self) -> &'static str {
        "Search/news page excerpt for corroboration"
    }
}
