//! Core identifiers and request types shared by every layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a configured provider (its configured name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Priority bucket of a provider.
///
/// The derived ordering is the try order: every primary provider is
/// considered before any backup provider, and last-resort providers last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Primary,
    Backup,
    LastResort,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Primary, Tier::Backup, Tier::LastResort];
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Primary => write!(f, "primary"),
            Tier::Backup => write!(f, "backup"),
            Tier::LastResort => write!(f, "last_resort"),
        }
    }
}

/// What kind of content a provider yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Images,
    Keywords,
    Snippets,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Images => write!(f, "images"),
            Capability::Keywords => write!(f, "keywords"),
            Capability::Snippets => write!(f, "snippets"),
        }
    }
}

/// Topic category, used by keyword sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Fashion,
    Food,
    Trend,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Fashion, Category::Food, Category::Trend];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Fashion => write!(f, "fashion"),
            Category::Food => write!(f, "food"),
            Category::Trend => write!(f, "trend"),
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fashion" => Ok(Category::Fashion),
            "food" => Ok(Category::Food),
            "trend" => Ok(Category::Trend),
            other => Err(format!("unknown category '{}'", other)),
        }
    }
}

/// Static description of a configured provider.
///
/// Loaded once from configuration and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub tier: Tier,
    pub capability: Capability,

    /// Whether the provider needs a credential at all
    pub requires_credentials: bool,

    /// Whether the required credential was found when the provider was built
    pub credentials_present: bool,
}

impl ProviderDescriptor {
    /// A provider that needs no credential (scrapers, static libraries).
    pub fn credential_free(id: impl Into<ProviderId>, tier: Tier, capability: Capability) -> Self {
        Self {
            id: id.into(),
            tier,
            capability,
            requires_credentials: false,
            credentials_present: false,
        }
    }

    /// A provider that needs a credential, with its presence recorded.
    pub fn with_credentials(
        id: impl Into<ProviderId>,
        tier: Tier,
        capability: Capability,
        present: bool,
    ) -> Self {
        Self {
            id: id.into(),
            tier,
            capability,
            requires_credentials: true,
            credentials_present: present,
        }
    }

    /// True unless a required credential is missing.
    pub fn is_ready(&self) -> bool {
        !self.requires_credentials || self.credentials_present
    }
}

impl From<String> for ProviderId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A single acquisition request.
///
/// Optional parameters are explicit fields; providers ignore the ones
/// that do not apply to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionRequest {
    /// Search keywords, subject, or feed query
    pub query: String,

    /// 1-based page number
    #[serde(default = "default_page")]
    pub page: u32,

    /// Maximum items wanted from a provider
    #[serde(default = "default_limit")]
    pub limit: u32,

    #[serde(default)]
    pub category: Option<Category>,

    #[serde(default)]
    pub region: Option<String>,

    /// Restrict the run to exactly this provider
    #[serde(default)]
    pub pinned: Option<ProviderId>,

    #[serde(default)]
    pub trace_id: Option<String>,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    20
}

impl AcquisitionRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            page: default_page(),
            limit: default_limit(),
            category: None,
            region: None,
            pinned: None,
            trace_id: None,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn pinned_to(mut self, provider: impl Into<ProviderId>) -> Self {
        self.pinned = Some(provider.into());
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Clamp `limit` to a vendor page-size ceiling.
    pub fn limit_capped(&self, ceiling: u32) -> u32 {
        self.limit.clamp(1, ceiling)
    }
}
