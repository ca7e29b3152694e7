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

pub const PEXELS_API_KEY_ENV: &str = "PEXELS_API_KEY";
const DEFAULT_BASE_URL: &str = "https://api.pexels.com/v1";
const MAX_PER_PAGE: u32 = 80;

/// Pexels photo search. The key goes in the bare `Authorization` header.
pub struct PexelsProvider {
    descriptor: ProviderDescriptor,
    credential: ApiCredential,
    base_url: String,
    health_url: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for PexelsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PexelsProvider")
            .field("descriptor", &self.descriptor)
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    photos: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    id: u64,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    alt: Option<String>,
    #[serde(default)]
    photographer: Option<String>,
    #[serde(default)]
    photographer_url: Option<String>,
    #[serde(default)]
    src: Sources,
}

#[derive(Debug, Default, Deserialize)]
struct Sources {
    large: Option<String>,
    original: Option<String>,
    medium: Option<String>,
    small: Option<String>,
}

impl PexelsProvider {
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

    fn to_item(&self, photo: Photo) -> Option<ImageItem> {
        let url = photo.src.large.or(photo.src.original)?;
        let item = ImageItem {
            id: format!("pexels_{}", photo.id),
            thumbnail_url: photo
                .src
                .medium
                .or(photo.src.small)
                .unwrap_or_else(|| url.clone()),
            url,
            source: self.descriptor.id.clone(),
            title: photo.alt.filter(|a| !a.is_empty()),
            photographer: photo.photographer,
            photographer_url: photo.photographer_url.filter(|u| !u.is_empty()),
            license: "Pexels License".to_string(),
            width: photo.width,
            height: photo.height,
            keywords: Vec::new(),
        };
        item.has_fetchable_url().then_some(item)
    }

    async fn search(&self, request: &AcquisitionRequest) -> Result<Vec<ImageItem>, ProviderError> {
        let per_page = request.limit_capped(MAX_PER_PAGE);
        let body: SearchResponse = http::get_json(
            self.client
                .get(http::join(&self.base_url, "search"))
                .header("Authorization", self.credential.expose())
                .query(&[
                    ("query", request.query.clone()),
                    ("page", request.page.to_string()),
                    ("per_page", per_page.to_string()),
                ]),
        )
        .await?;

        Ok(body
            .photos
            .into_iter()
            .filter_map(|photo| self.to_item(photo))
            .collect())
    }
}

#[async_trait]
impl Provider for PexelsProvider {
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

pub struct PexelsFactory;

impl ProviderFactory<ImageItem> for PexelsFactory {
    fn kind(&self) -> &'static str {
        "pexels"
    }

    fn capability(&self) -> Capability {
        Capability::Images
    }

    fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider<Item = ImageItem>>, ProviderError> {
        let credential = match credential_for(config, PEXELS_API_KEY_ENV, "Pexels API key") {
            Ok(credential) => credential,
            Err(e) => return Ok(unconfigured(config, e)),
        };
        let descriptor =
            ProviderDescriptor::with_credentials(config.name.as_str(), config.tier, config.capability, true);
        let mut provider = PexelsProvider::new(descriptor, credential, HttpSettings::default().build_client()?);
        if let Some(endpoint) = &config.endpoint {
            provider = provider.with_base_url(endpoint);
        }
        if let Some(url) = &config.health_endpoint {
            provider = provider.with_health_url(url);
        }
        Ok(Arc::new(provider))
    }

    fn description(&self) -> &'static str {
        "Pexels photo search (up to 80 per page)"
    }
}
