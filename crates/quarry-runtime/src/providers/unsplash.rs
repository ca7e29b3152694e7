//! Unsplash photo search.

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

pub const UNSPLASH_ACCESS_KEY_ENV: &str = "UNSPLASH_ACCESS_KEY";
const DEFAULT_BASE_URL: &str = "https://api.unsplash.com";
const MAX_PER_PAGE: u32 = 30;

pub struct UnsplashProvider {
    descriptor: ProviderDescriptor,
    credential: ApiCredential,
    base_url: String,
    health_url: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for UnsplashProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnsplashProvider")
            .field("descriptor", &self.descriptor)
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    id: String,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    alt_description: Option<String>,
    urls: PhotoUrls,
    #[serde(default)]
    user: Option<User>,
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Debug, Default, Deserialize)]
struct PhotoUrls {
    regular: Option<String>,
    full: Option<String>,
    small: Option<String>,
    thumb: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    links: Option<UserLinks>,
}

#[derive(Debug, Deserialize)]
struct UserLinks {
    #[serde(default)]
    html: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    #[serde(default)]
    title: String,
}

impl UnsplashProvider {
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
        let url = photo.urls.regular.or(photo.urls.full)?;
        let thumbnail_url = photo
            .urls
            .thumb
            .or(photo.urls.small)
            .unwrap_or_else(|| url.clone());
        let (photographer, photographer_url) = match photo.user {
            Some(user) => (user.name, user.links.and_then(|l| l.html)),
            None => (None, None),
        };
        let item = ImageItem {
            id: photo.id,
            url,
            thumbnail_url,
            source: self.descriptor.id.clone(),
            title: photo.description.or(photo.alt_description),
            photographer,
            photographer_url,
            license: "Unsplash License".to_string(),
            width: photo.width,
            height: photo.height,
            keywords: photo
                .tags
                .into_iter()
                .map(|t| t.title)
                .filter(|t| !t.is_empty())
                .collect(),
        };
        item.has_fetchable_url().then_some(item)
    }

    async fn search(&self, request: &AcquisitionRequest) -> Result<Vec<ImageItem>, ProviderError> {
        let per_page = request.limit_capped(MAX_PER_PAGE);
        let body: SearchResponse = http::get_json(
            self.client
                .get(http::join(&self.base_url, "search/photos"))
                // SECURITY: credential exposed only at the point of use
                .header("Authorization", format!("Client-ID {}", self.credential.expose()))
                .header("Accept-Version", "v1")
                .query(&[
                    ("query", request.query.clone()),
                    ("page", request.page.to_string()),
                    ("per_page", per_page.to_string()),
                ]),
        )
        .await?;

        Ok(body
            .results
            .into_iter()
            .filter_map(|photo| self.to_item(photo))
            .collect())
    }
}

#[async_trait]
impl Provider for UnsplashProvider {
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

pub struct UnsplashFactory;

impl ProviderFactory<ImageItem> for UnsplashFactory {
    fn kind(&self) -> &'static str {
        "unsplash"
    }

    fn capability(&self) -> Capability {
        Capability::Images
    }

    fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider<Item = ImageItem>>, ProviderError> {
        let credential = match credential_for(config, UNSPLASH_ACCESS_KEY_ENV, "Unsplash access key") {
            Ok(credential) => credential,
            Err(e) => return Ok(unconfigured(config, e)),
        };
        let descriptor =
            ProviderDescriptor::with_credentials(config.name.as_str(), config.tier, config.capability, true);
        let mut provider = UnsplashProvider::new(descriptor, credential, HttpSettings::default().build_client()?);
        if let Some(endpoint) = &config.endpoint {
            provider = provider.with_base_url(endpoint);
        }
        if let Some(url) = &config.health_endpoint {
            provider = provider.with_health_url(url);
        }
        Ok(Arc::new(provider))
    }

    fn description(&self) -> &'static str {
        "Unsplash photo search (Client-ID header, up to 30 per page)"
    }
}
