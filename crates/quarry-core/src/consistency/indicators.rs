//! Indicator vocabulary for telling factual subjects from trend subjects.
//!
//! A subject is factual when it mentions something a reader could check:
//! a year or season, a price, a rank, or a place.

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};

lazy_static! {
    /// Four-digit years from 1900 to 2099
    pub static ref YEAR_PATTERN: Regex = Regex::new(r"(?:19|20)\d{2}").unwrap();

    /// Fashion seasons
    pub static ref SEASON_PATTERN: Regex = Regex::new(r"春夏|秋冬|(?i:\b(?:spring|summer|fall|autumn|winter)\s+(?:19|20)\d{2}\b)").unwrap();

    /// Prices and currency markers
    pub static ref PRICE_PATTERN: Regex = Regex::new(r"(?i)\$|HK\$|元|價格|\bprice[sd]?\b").unwrap();

    /// Ranked lists: "top 3", "#1", "第一", 排行榜, 名次
    pub static ref RANKING_PATTERN: Regex = Regex::new(r"(?i)\btop\b|#\d+|第|排行榜|名次|\branking\b|\brank(?:ed)?\b").unwrap();

    /// Addresses and the places the product cares about
    pub static ref PLACE_PATTERN: Regex = Regex::new(r"(?i)地址|元朗|香港|\bhong\s+kong\b|\baddress\b").unwrap();
}

/// Which indicator family matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Year,
    Season,
    Price,
    Ranking,
    Place,
}

/// Decides whether a subject is factual.
///
/// Implementations must be pure; the validator may call them repeatedly.
pub trait SubjectClassifier: Send + Sync {
    /// Indicator families found in `subject`.
    fn indicators(&self, subject: &str) -> Vec<Indicator>;

    fn is_factual(&self, subject: &str) -> bool {
        !self.indicators(subject).is_empty()
    }
}

/// Regex rule engine over the built-in vocabulary plus extra place names.
#[derive(Debug, Clone, Default)]
pub struct RuleClassifier {
    extra_places: Option<Regex>,
}

impl RuleClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add place names (districts, malls, venues) that mark a subject as factual.
    pub fn with_places<I, S>(mut self, places: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let alternatives: Vec<String> = places
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .map(|p| regex::escape(&p))
            .collect();
        if alternatives.is_empty() {
            return self;
        }
        self.extra_places = RegexBuilder::new(&alternatives.join("|"))
            .case_insensitive(true)
            .build()
            .ok();
        self
    }
}

impl SubjectClassifier for RuleClassifier {
    fn indicators(&self, subject: &str) -> Vec<Indicator> {
        let mut found = Vec::new();
        if YEAR_PATTERN.is_match(subject) {
            found.push(Indicator::Year);
        }
        if SEASON_PATTERN.is_match(subject) {
            found.push(Indicator::Season);
        }
        if PRICE_PATTERN.is_match(subject) {
            found.push(Indicator::Price);
        }
        if RANKING_PATTERN.is_match(subject) {
            found.push(Indicator::Ranking);
        }
        let extra = self
            .extra_places
            .as_ref()
            .map(|re| re.is_match(subject))
            .unwrap_or(false);
        if PLACE_PATTERN.is_match(subject) || extra {
            found.push(Indicator::Place);
        }
        found
    }
}
