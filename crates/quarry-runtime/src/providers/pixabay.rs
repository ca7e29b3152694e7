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

pub const PIXABAY_API_KEY_ENV: &str = "PIXABAY_API_KEY";
const DEFAULT_BASE_URL: &str = "https://pixabay.com/api/";
const MAX_PER_PAGE: u32 = 200;
// Pixabay rejects per_page below 3
const MIN_PER_PAGE: u32 = 3;

/// Pixabay photo search. The key travels as the `key` query parameter.
pub struct PixabayProvider {
    descriptor: ProviderDescriptor,
    credential: ApiCredential,
    base_url: String,
    health_url: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for PixabayProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixabayProvider")
            .field("descriptor", &self.descriptor)
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Hit {
    id: u64,
    #[serde(default, rename = "largeImageURL")]
    large_image_url: Option<String>,
    #[serde(default, rename = "webformatURL")]
    webformat_url: Option<String>,
    #[serde(default, rename = "previewURL")]
    preview_url: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default, rename = "user_id")]
    user_id: Option<u64>,
    #[serde(default)]
    image_width: Option<u32>,
    #[serde(default)]
    image_height: Option<u32>,
    #[serde(default)]
    tags: String,
}

impl PixabayProvider {
    pub fn new(descriptor: ProviderDescriptor, credential: ApiCredential, client: reqwest::Client) -> Self {
        Self {
            descriptor,
            credential,
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

    fn to_item(&self, hit: Hit) -> Option<ImageItem> {
        let url = hit.large_image_url.or_else(|| hit.webformat_url.clone())?;
        let thumbnail_url = hit
            .preview_url
            .or(hit.webformat_url)
            .unwrap_or_else(|| url.clone());
        let photographer_url = hit.user.as_ref().map(|user| {
            format!(
                "https://pixabay.com/users/{}-{}/",
                user,
                hit.user_id.map(|id| id.to_string()).unwrap_or_default()
            )
        });
        let keywords: Vec<String> = hit
            .tags
            .split(", ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();

        let item = ImageItem {
            id: format!("pixabay_{}", hit.id),
            url,
            thumbnail_url,
            source: self.descriptor.id.clone(),
            title: (!hit.tags.is_empty()).then(|| hit.tags.clone()),
            photographer: hit.user,
            photographer_url,
            license: "Pixabay License".to_string(),
            width: hit.image_width,
            height: hit.image_height,
            keywords,
        };
        item.has_fetchable_url().then_some(item)
    }

    async fn search(&self, request: &AcquisitionRequest) -> Result<Vec<ImageItem>, ProviderError> {
        let per_page = request.limit_capped(MAX_PER_PAGE).max(MIN_PER_PAGE);
        let body: SearchResponse = http::get_json(self.client.get(&self.base_url).query(&[
            ("key", self.credential.expose().to_string()),
            ("q", request.query.clone()),
            ("page", request.page.to_string()),
            ("per_page", per_page.to_string()),
            ("image_type", "photo".to_string()),
            ("orientation", "horizontal".to_string()),
            ("safesearch", "true".to_string()),
        ]))
        .await?;

        Ok(body
            .hits
            .into_iter()
            .filter_map(|hit| self.to_item(hit))
            .take(request.limit as usize)
            .collect())
    }
}

#[async_trait]
impl Provider for PixabayProvider {
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

pub struct PixabayFactory;

impl ProviderFactory<ImageItem> for PixabayFactory {
    fn kind(&self) -> &'static str {
        "pixabay"
    }

    fn capability(&self) -> Capability {
        Capability::Images
    }

    fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider<Item = ImageItem>>, ProviderError> {
        let credential = match credential_for(config, PIXABAY_API_KEY_ENV, "Pixabay API key") {
            Ok(credential) => credential,
            Err(e) => return Ok(unconfigured(config, e)),
        };
        let descriptor =
            ProviderDescriptor::with_credentials(config.name.as_str(), config.tier, config.capability, true);
        let mut provider = PixabayProvider::new(descriptor, credential, HttpSettings::default().build_client()?);
        if let Some(endpoint) = &config.endpoint {
            provider = provider.with_base_url(endpoint);
        }
        if let Some(url) = &config.health_endpoint {
            provider = provider.with_health_url(url);
        }
        Ok(Arc::new(provider))
    }

    fn description(&self) -> &'static str {
        "Pixabay photo search (up to 200 per page)"
    }
}
