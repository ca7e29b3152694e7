//! DuckDuckGo image search, the credential-free last resort for images.
//!
//! There is no public API. The adapter loads the search page, pulls the
//! `vqd` token out of it and calls the `i.js` JSON endpoint. When the token
//! is missing or the JSON call is refused, it scrapes image URLs straight
//! out of the page it already has.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use quarry_core::{
    AcquisitionRequest, Capability, ImageItem, Outcome, ProbeSample, ProviderConfig,
    ProviderDescriptor,
};

use super::http::{self, HttpSettings, BROWSER_USER_AGENT};
use super::{Provider, ProviderError, ProviderFactory};

const DEFAULT_BASE_URL: &str = "https://duckduckgo.com";
const MAX_PER_PAGE: u32 = 50;
const ID_LINK_CHARS: usize = 50;

lazy_static! {
    static ref VQD_QUOTED: Regex = Regex::new(r#"vqd="([^"]+)""#).unwrap();
    static ref VQD_BARE: Regex = Regex::new(r"vqd=([^&]+)").unwrap();
    static ref PAGE_IMAGE_PATTERNS: Vec<Regex> = vec![
        Regex::new(r#"data-src="([^"]+)""#).unwrap(),
        Regex::new(r#"src="([^"]+\.(?:jpg|jpeg|png|gif|webp))""#).unwrap(),
        Regex::new(r#"data-image="([^"]+)""#).unwrap(),
    ];
}

const SKIPPED_FRAGMENTS: &[&str] = &["logo", "icon", "button", "avatar"];

#[derive(Debug, Deserialize)]
struct ImageResults {
    #[serde(default)]
    results: Vec<ImageResult>,
}

#[derive(Debug, Deserialize)]
struct ImageResult {
    #[serde(default)]
    image: String,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    title: Option<String>,
}

/// Pull the `vqd` token out of a search page.
pub(crate) fn extract_vqd(html: &str) -> Option<String> {
    VQD_QUOTED
        .captures(html)
        .or_else(|| VQD_BARE.captures(html))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|v| !v.is_empty())
}

/// Image URLs embedded in a page, deduplicated, in pattern order.
pub(crate) fn scrape_image_urls(html: &str, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for pattern in PAGE_IMAGE_PATTERNS.iter() {
        for capture in pattern.captures_iter(html) {
            if urls.len() >= limit {
                return urls;
            }
            let url = &capture[1];
            let lowered = url.to_lowercase();
            if !url.starts_with("http") || SKIPPED_FRAGMENTS.iter().any(|s| lowered.contains(s)) {
                continue;
            }
            if seen.insert(url.to_string()) {
                urls.push(url.to_string());
            }
        }
    }
    urls
}

#[derive(Debug)]
pub struct DuckDuckGoProvider {
    descriptor: ProviderDescriptor,
    base_url: String,
    health_url: Option<String>,
    client: reqwest::Client,
}

impl DuckDuckGoProvider {
    pub fn new(descriptor: ProviderDescriptor, client: reqwest::Client) -> Self {
        Self {
            descriptor,
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

    fn item(&self, url: String, thumbnail: Option<String>, title: Option<String>, query: &str) -> ImageItem {
        ImageItem {
            id: format!("ddg_{}", url.chars().take(ID_LINK_CHARS).collect::<String>()),
            thumbnail_url: thumbnail.unwrap_or_else(|| url.clone()),
            url,
            source: self.descriptor.id.clone(),
            photographer: title
                .as_deref()
                .and_then(|t| t.split_once(" - "))
                .map(|(credit, _)| credit.to_string()),
            title,
            photographer_url: None,
            license: "Unknown".to_string(),
            width: None,
            height: None,
            keywords: vec![query.to_string()],
        }
    }

    fn from_page(&self, html: &str, request: &AcquisitionRequest, limit: u32) -> Vec<ImageItem> {
        scrape_image_urls(html, limit as usize)
            .into_iter()
            .map(|url| self.item(url, None, Some(request.query.clone()), &request.query))
            .collect()
    }

    async fn search(&self, request: &AcquisitionRequest) -> Result<Vec<ImageItem>, ProviderError> {
        let limit = request.limit_capped(MAX_PER_PAGE);
        let page_html = http::get_text(
            self.client
                .get(http::join(&self.base_url, "/"))
                .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
                .query(&[("q", request.query.as_str()), ("iax", "images"), ("ia", "images")]),
        )
        .await?;

        let Some(vqd) = extract_vqd(&page_html) else {
            tracing::debug!(provider = %self.descriptor.id, "no vqd token, scraping search page");
            return Ok(self.from_page(&page_html, request, limit));
        };

        let offset = request.page.saturating_sub(1) * limit;
        let results: Result<ImageResults, ProviderError> = http::get_json(
            self.client
                .get(http::join(&self.base_url, "i.js"))
                .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
                .query(&[
                    ("q", request.query.clone()),
                    ("o", "json".to_string()),
                    ("p", request.page.to_string()),
                    ("s", offset.to_string()),
                    ("vqd", vqd),
                    ("f", ",,,".to_string()),
                    ("u", "bing".to_string()),
                ]),
        )
        .await;

        match results {
            Ok(body) => Ok(body
                .results
                .into_iter()
                .filter(|r| !r.image.is_empty())
                .take(limit as usize)
                .map(|r| {
                    let mut item = self.item(r.image, r.thumbnail, r.title, &request.query);
                    item.width = r.width;
                    item.height = r.height;
                    item
                })
                .filter(ImageItem::has_fetchable_url)
                .collect()),
            Err(e @ (ProviderError::RateLimited { .. } | ProviderError::Timeout)) => Err(e),
            Err(e) => {
                tracing::warn!(provider = %self.descriptor.id, error = %e, "image endpoint refused, scraping search page");
                Ok(self.from_page(&page_html, request, limit))
            }
        }
    }
}

#[async_trait]
impl Provider for DuckDuckGoProvider {
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
        let url = self.health_url.as_deref().unwrap_or(&self.base_url);
        Some(http::probe(&self.client, url, timeout).await)
    }
}

pub struct DuckDuckGoFactory;

impl ProviderFactory<ImageItem> for DuckDuckGoFactory {
    fn kind(&self) -> &'static str {
        "duckduckgo"
    }

    fn capability(&self) -> Capability {
        Capability::Images
    }

    fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider<Item = ImageItem>>, ProviderError> {
        let descriptor = ProviderDescriptor::credential_free(config.name.as_str(), config.tier, config.capability);
        let mut provider = DuckDuckGoProvider::new(descriptor, HttpSettings::default().build_client()?);
        if let Some(endpoint) = &config.endpoint {
            provider = provider.with_base_url(endpoint);
        }
        if let Some(url) = &config.health_endpoint {
            provider = provider.with_health_url(url);
        }
        Ok(Arc::new(provider))
    }

    fn description(&self) -> &'static str {
        "DuckDuckGo image search (no credentials, up to 50 per page)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_vqd_quoted_then_bare() {
        assert_eq!(extract_vqd(r#"<script>vqd="4-1234567";</script>"#).as_deref(), Some("4-1234567"));
        assert_eq!(extract_vqd("/d.js?q=cats&vqd=4-999&p=1").as_deref(), Some("4-999"));
        assert_eq!(extract_vqd("<html>nothing here</html>"), None);
    }

    #[test]
    fn test_scrape_skips_decorations_and_duplicates() {
        let html = r#"
            <img data-src="https://img.example.com/cat.jpg">
            <img data-src="https://img.example.com/cat.jpg">
            <img data-src="https://duckduckgo.com/assets/logo.png">
            <img src="/relative/dog.png">
            <img src="https://img.example.com/dog.png">
            <div data-image="https://img.example.com/bird.webp"></div>
        "#;
        let urls = scrape_image_urls(html, 10);
        assert_eq!(
            urls,
            vec![
                "https://img.example.com/cat.jpg",
                "https://img.example.com/dog.png",
                "https://img.example.com/bird.webp",
            ]
        );
        assert_eq!(scrape_image_urls(html, 1).len(), 1);
    }
}
