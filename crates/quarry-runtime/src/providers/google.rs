//! Google Custom Search, image mode.
//!
//! Needs two values: the API key and the search engine id (`cx`). Either
//! one missing leaves the provider unconfigured. Google reports no license,
//! so every item carries `"Unknown"`.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use quarry_core::{
    AcquisitionRequest, Capability, ImageItem, Outcome, ProbeSample, ProviderConfig,
    ProviderDescriptor,
};

use super::factory::{credential_for, unconfigured};
use super::http::{self, HttpSettings};
use super::{ApiCredential, Provider, ProviderError, ProviderFactory};

pub const GOOGLE_API_KEY_ENV: &str = "GOOGLE_API_KEY";
pub const GOOGLE_SEARCH_ENGINE_ID_ENV: &str = "GOOGLE_SEARCH_ENGINE_ID";
const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/customsearch/v1";
const MAX_PER_PAGE: u32 = 10;
const ID_LINK_CHARS: usize = 50;

pub struct GoogleImagesProvider {
    descriptor: ProviderDescriptor,
    api_key: ApiCredential,
    engine_id: ApiCredential,
    base_url: String,
    health_url: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for GoogleImagesProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleImagesProvider")
            .field("descriptor", &self.descriptor)
            .field("api_key", &self.api_key)
            .field("engine_id", &self.engine_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Item {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    display_link: Option<String>,
    #[serde(default)]
    image: Option<ImageMeta>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageMeta {
    #[serde(default)]
    thumbnail_link: Option<String>,
    #[serde(default)]
    context_link: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

impl GoogleImagesProvider {
    pub fn new(
        descriptor: ProviderDescriptor,
        api_key: ApiCredential,
        engine_id: ApiCredential,
        client: reqwest::Client,
    ) -> Self {
        Self {
            descriptor,
            api_key,
            engine_id,
            base_url: DEFAULT_BASE_URL.to_string(),
            health_url: None,
            client,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_health_url(mut self, url: impl Into<String>) -> Self {
        self.health_url = Some(url.into());
        self
    }

    fn to_item(&self, item: Item, query: &str) -> Option<ImageItem> {
        if item.link.is_empty() {
            return None;
        }
        let (thumbnail, context, width, height) = match item.image {
            Some(meta) => (meta.thumbnail_link, meta.context_link, meta.width, meta.height),
            None => (None, None, None, None),
        };
        let image = ImageItem {
            id: format!("google_{}", item.link.chars().take(ID_LINK_CHARS).collect::<String>()),
            thumbnail_url: thumbnail.unwrap_or_else(|| item.link.clone()),
            url: item.link,
            source: self.descriptor.id.clone(),
            title: item.title,
            photographer: item.display_link,
            photographer_url: context,
            license: "Unknown".to_string(),
            width,
            height,
            keywords: vec![query.to_string()],
        };
        image.has_fetchable_url().then_some(image)
    }

    async fn search(&self, request: &AcquisitionRequest) -> Result<Vec<ImageItem>, ProviderError> {
        let num = request.limit_capped(MAX_PER_PAGE);
        let start = request.page.saturating_sub(1) * num + 1;
        let body: SearchResponse = http::get_json(self.client.get(&self.base_url).query(&[
            ("key", self.api_key.expose().to_string()),
            ("cx", self.engine_id.expose().to_string()),
            ("q", request.query.clone()),
            ("searchType", "image".to_string()),
            ("num", num.to_string()),
            ("start", start.to_string()),
            ("safe", "active".to_string()),
        ]))
        .await?;

        Ok(body
            .items
            .into_iter()
            .filter_map(|item| self.to_item(item, &request.query))
            .collect())
    }
}

#[async_trait]
impl Provider for GoogleImagesProvider {
    type Item = ImageItem;

    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn attempt(&self, request: &AcquisitionRequest) -> Outcome<ImageItem> {
        match self.search(request).await {
            Ok(items) => Outcome::Success(items).normalize(),
            Err(e) => e.into_outcome(),
        }
    }

    async fn health_check(&self, timeout: Duration) -> Option<ProbeSample> {
        match &self.health_url {
            Some(url) => Some(http::probe(&self.client, url, timeout).await),
            None => None,
        }
    }
}

pub struct GoogleImagesFactory;

impl ProviderFactory<ImageItem> for GoogleImagesFactory {
    fn kind(&self) -> &'static str {
        "google_cse"
    }

    fn capability(&self) -> Capability {
        Capability::Images
    }

    fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider<Item = ImageItem>>, ProviderError> {
        let api_key = match credential_for(config, GOOGLE_API_KEY_ENV, "Google API key") {
            Ok(credential) => credential,
            Err(e) => return Ok(unconfigured(config, e)),
        };
        let engine_env = config
            .secondary_credential_env
            .as_deref()
            .unwrap_or(GOOGLE_SEARCH_ENGINE_ID_ENV);
        let engine_id = match ApiCredential::from_env(engine_env, "Google search engine id") {
            Ok(credential) => credential,
            Err(e) => return Ok(unconfigured(config, e)),
        };

        let descriptor =
            ProviderDescriptor::with_credentials(config.name.as_str(), config.tier, config.capability, true);
        let mut provider = GoogleImagesProvider::new(
            descriptor,
            api_key,
            engine_id,
            HttpSettings::default().build_client()?,
        );
        if let Some(endpoint) = &config.endpoint {
            provider = provider.with_base_url(endpoint);
        }
        if let Some(url) = &config.health_endpoint {
            provider = provider.with_health_url(url);
        }
        Ok(Arc::new(provider))
    }

    fn description(&self) -> &'static str {
        "Google Custom Search image mode (API key + engine id, up to 10 per page)"
    }
}
