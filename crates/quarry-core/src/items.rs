//! Item types produced by the built-in providers.
//!
//! The engine itself is generic over the item type; these are the shapes
//! the bundled adapters emit.

use serde::{Deserialize, Serialize};

use crate::consistency::Fingerprint;
use crate::types::{Category, ProviderId};

/// A stock or searched image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageItem {
    pub id: String,
    pub url: String,
    pub thumbnail_url: String,
    pub source: ProviderId,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub photographer: Option<String>,

    #[serde(default)]
    pub photographer_url: Option<String>,

    /// License label, "Unknown" when the vendor does not say
    pub license: String,

    #[serde(default)]
    pub width: Option<u32>,

    #[serde(default)]
    pub height: Option<u32>,

    #[serde(default)]
    pub keywords: Vec<String>,
}

impl ImageItem {
    /// Only absolute http(s) URLs survive provider filtering.
    pub fn has_fetchable_url(&self) -> bool {
        is_http_url(&self.url)
    }
}

impl Fingerprint for ImageItem {
    fn fingerprint(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(title) = &self.title {
            parts.push(title);
        }
        parts.extend(self.keywords.iter().map(|k| k.as_str()));
        parts.join(" ")
    }
}

/// A topic keyword harvested from a trend source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicKeyword {
    pub keyword: String,

    #[serde(default)]
    pub category: Option<Category>,

    pub source: ProviderId,

    /// Set when the keyword came from the static fallback library
    #[serde(default)]
    pub fallback: bool,
}

impl Fingerprint for TopicKeyword {
    fn fingerprint(&self) -> String {
        self.keyword.clone()
    }
}

/// A short text excerpt fetched from a source page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSnippet {
    pub url: String,

    #[serde(default)]
    pub title: Option<String>,

    pub snippet: String,
    pub source: ProviderId,
}

/// Maximum characters kept in a [`SourceSnippet`].
pub const SNIPPET_MAX_CHARS: usize = 500;

impl SourceSnippet {
    /// Build a snippet, truncating on a character boundary.
    pub fn new(url: impl Into<String>, title: Option<String>, text: &str, source: ProviderId) -> Self {
        let snippet: String = text.chars().take(SNIPPET_MAX_CHARS).collect();
        Self {
            url: url.into(),
            title,
            snippet,
            source,
        }
    }
}

impl Fingerprint for SourceSnippet {
    fn fingerprint(&self) -> String {
        match &self.title {
            Some(title) => format!("{} {}", title, self.snippet),
            None => self.snippet.clone(),
        }
    }
}

pub fn is_http_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}
