//! Static keyword library, the last resort for topic keywords.

use async_trait::async_trait;
use std::sync::Arc;

use quarry_core::{
    AcquisitionRequest, Capability, Category, Outcome, ProviderConfig, ProviderDescriptor,
    TopicKeyword,
};

use super::{Provider, ProviderError, ProviderFactory};

const FASHION: &[&str] = &[
    "2025春夏時尚趨勢",
    "可持續時尚",
    "復古風格回歸",
    "街頭時尚",
    "時尚科技",
    "環保時尚",
];

const FOOD: &[&str] = &[
    "香港美食推薦",
    "街頭小吃",
    "傳統美食",
    "新興餐廳",
    "美食趨勢",
    "健康飲食",
];

const TREND: &[&str] = &[
    "AI技術發展",
    "可持續發展",
    "社會趨勢",
    "科技創新",
    "文化現象",
    "生活方式",
];

/// Built-in keywords for a category.
pub fn fallback_keywords(category: Category) -> &'static [&'static str] {
    match category {
        Category::Fashion => FASHION,
        Category::Food => FOOD,
        Category::Trend => TREND,
    }
}

/// Serves keywords from the built-in library. Never fails, never blocks.
#[derive(Debug)]
pub struct KeywordLibraryProvider {
    descriptor: ProviderDescriptor,
}

impl KeywordLibraryProvider {
    pub fn new(descriptor: ProviderDescriptor) -> Self {
        Self { descriptor }
    }
}

#[async_trait]
impl Provider for KeywordLibraryProvider {
    type Item = TopicKeyword;

    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn attempt(&self, request: &AcquisitionRequest) -> Outcome<TopicKeyword> {
        let categories: Vec<Category> = match request.category {
            Some(category) => vec![category],
            None => Category::ALL.to_vec(),
        };

        let keywords: Vec<TopicKeyword> = categories
            .into_iter()
            .flat_map(|category| {
                fallback_keywords(category).iter().map(move |keyword| TopicKeyword {
                    keyword: keyword.to_string(),
                    category: Some(category),
                    source: self.descriptor.id.clone(),
                    fallback: true,
                })
            })
            .take(request.limit as usize)
            .collect();

        Outcome::Success(keywords).normalize()
    }
}

pub struct KeywordLibraryFactory;

impl ProviderFactory<TopicKeyword> for KeywordLibraryFactory {
    fn kind(&self) -> &'static str {
        "keyword_library"
    }

    fn capability(&self) -> Capability {
        Capability::Keywords
    }

    fn create(
        &self,
        config: &ProviderConfig,
    ) -> Result<Arc<dyn Provider<Item = TopicKeyword>>, ProviderError> {
        Ok(Arc::new(KeywordLibraryProvider::new(
            ProviderDescriptor::credential_free(config.name.as_str(), config.tier, config.capability),
        )))
    }

    fn description(&self) -> &'static str {
        "Built-in fallback keyword library"
    }
}
