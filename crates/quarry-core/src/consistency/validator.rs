use std::collections::BTreeSet;
use std::sync::Arc;

use super::{
    ConsistencyConfig, ConsistencyVerdict, ConsistencyWarning, Fingerprint, RejectionReason,
    RuleClassifier, SubjectClassifier,
};
use crate::types::ProviderId;

/// Confidence given to a subject accepted on one provider's word.
const SINGLE_SOURCE_CONFIDENCE: f64 = 0.5;

pub struct ConsistencyValidator {
    classifier: Arc<dyn SubjectClassifier>,
    threshold: f64,
    required_sources: usize,
}

impl std::fmt::Debug for ConsistencyValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsistencyValidator")
            .field("threshold", &self.threshold)
            .field("required_sources", &self.required_sources)
            .finish_non_exhaustive()
    }
}

impl Default for ConsistencyValidator {
    fn default() -> Self {
        Self::from_config(&ConsistencyConfig::default())
    }
}

impl ConsistencyValidator {
    pub fn from_config(config: &ConsistencyConfig) -> Self {
        Self {
            classifier: Arc::new(RuleClassifier::new().with_places(&config.extra_places)),
            threshold: config.threshold,
            required_sources: config.required_sources.max(1),
        }
    }

    /// Replace the subject classifier.
    pub fn with_classifier(mut self, classifier: Arc<dyn SubjectClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn is_factual(&self, subject: &str) -> bool {
        self.classifier.is_factual(subject)
    }

    /// Successes needed before a subject can be judged.
    pub fn sources_needed(&self, subject: &str) -> usize {
        if self.is_factual(subject) {
            self.required_sources
        } else {
            1
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Judge the per-provider results gathered for `subject`.
    ///
    /// Providers that contributed no items are ignored; a provider listed
    /// twice counts once.
    pub fn validate<T: Fingerprint>(
        &self,
        subject: &str,
        sources: &[(ProviderId, Vec<T>)],
    ) -> ConsistencyVerdict {
        let is_factual = self.is_factual(subject);
        let profiles = source_profiles(sources);
        let found = profiles.len();

        if !is_factual {
            return match found {
                0 => ConsistencyVerdict {
                    valid: false,
                    is_factual,
                    confidence: 0.0,
                    required_sources: 1,
                    warnings: Vec::new(),
                    reason: Some(RejectionReason::InsufficientSources { found, required: 1 }),
                },
                1 => single_source(is_factual, 1),
                _ => ConsistencyVerdict {
                    valid: true,
                    is_factual,
                    confidence: 1.0,
                    required_sources: 1,
                    warnings: Vec::new(),
                    reason: None,
                },
            };
        }

        if found < self.required_sources {
            return ConsistencyVerdict {
                valid: false,
                is_factual,
                confidence: 0.0,
                required_sources: self.required_sources,
                warnings: Vec::new(),
                reason: Some(RejectionReason::InsufficientSources {
                    found,
                    required: self.required_sources,
                }),
            };
        }

        // only reachable with `required_sources: 1`; there is no pair to compare
        if found == 1 {
            return single_source(is_factual, self.required_sources);
        }

        let score = best_pair_score(&profiles);
        if score < self.threshold {
            return ConsistencyVerdict {
                valid: false,
                is_factual,
                confidence: score,
                required_sources: self.required_sources,
                warnings: Vec::new(),
                reason: Some(RejectionReason::Inconsistent {
                    score,
                    threshold: self.threshold,
                }),
            };
        }

        ConsistencyVerdict {
            valid: true,
            is_factual,
            confidence: score,
            required_sources: self.required_sources,
            warnings: Vec::new(),
            reason: None,
        }
    }
}

fn single_source(is_factual: bool, required_sources: usize) -> ConsistencyVerdict {
    ConsistencyVerdict {
        valid: true,
        is_factual,
        confidence: SINGLE_SOURCE_CONFIDENCE,
        required_sources,
        warnings: vec![ConsistencyWarning::SingleSource],
        reason: None,
    }
}

/// One token set per distinct provider with at least one item.
fn source_profiles<T: Fingerprint>(sources: &[(ProviderId, Vec<T>)]) -> Vec<BTreeSet<String>> {
    let mut seen: Vec<&ProviderId> = Vec::new();
    let mut profiles = Vec::new();
    for (provider, items) in sources {
        if items.is_empty() || seen.contains(&provider) {
            continue;
        }
        seen.push(provider);
        let mut set = BTreeSet::new();
        for item in items {
            set.extend(tokens(&item.fingerprint()));
        }
        profiles.push(set);
    }
    profiles
}

fn best_pair_score(profiles: &[BTreeSet<String>]) -> f64 {
    let mut best = 0.0_f64;
    for (i, a) in profiles.iter().enumerate() {
        for b in &profiles[i + 1..] {
            best = best.max(jaccard(a, b));
        }
    }
    best
}

/// Split text into lowercase tokens.
///
/// ASCII letters and digits form words; every other alphanumeric character
/// (CJK ideographs in practice) is a token of its own.
pub fn tokens(text: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let mut word = String::new();
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            word.push(c.to_ascii_lowercase());
            continue;
        }
        if !word.is_empty() {
            out.insert(std::mem::take(&mut word));
        }
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase().map(String::from));
        }
    }
    if !word.is_empty() {
        out.insert(word);
    }
    out
}

/// Jaccard index of two token sets; 0 when both are empty.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(name: &str, items: &[&str]) -> (ProviderId, Vec<String>) {
        (
            ProviderId::new(name),
            items.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn test_factual_subject_with_one_source_is_rejected() {
        let validator = ConsistencyValidator::default();
        let verdict = validator.validate("top 3 dim sum", &[src("a", &["Tim Ho Wan"])]);
        assert!(!verdict.valid);
        assert!(verdict.is_factual);
        assert_eq!(
            verdict.reason,
            Some(RejectionReason::InsufficientSources {
                found: 1,
                required: 2
            })
        );
    }

    #[test]
    fn test_factual_subject_with_agreeing_sources_is_accepted() {
        let validator = ConsistencyValidator::default();
        let verdict = validator.validate(
            "top 3 dim sum",
            &[
                src("a", &["Tim Ho Wan", "Lin Heung"]),
                src("b", &["lin heung", "tim ho wan"]),
            ],
        );
        assert!(verdict.valid);
        assert!(verdict.confidence >= 0.9);
        assert!(verdict.warnings.is_empty());
    }

    #[test]
    fn test_factual_subject_with_disagreeing_sources_is_inconsistent() {
        let validator = ConsistencyValidator::default();
        let verdict = validator.validate(
            "2026 price list",
            &[src("a", &["alpha beta"]), src("b", &["gamma delta"])],
        );
        assert!(!verdict.valid);
        assert!(matches!(
            verdict.reason,
            Some(RejectionReason::Inconsistent { .. })
        ));
    }

    #[test]
    fn test_one_required_source_accepts_factual_subject_with_warning() {
        let validator = ConsistencyValidator::from_config(&ConsistencyConfig {
            required_sources: 1,
            ..ConsistencyConfig::default()
        });
        assert_eq!(validator.sources_needed("top 3 dim sum"), 1);

        let verdict = validator.validate("top 3 dim sum", &[src("a", &["Tim Ho Wan"])]);
        assert!(verdict.valid);
        assert!(verdict.is_factual);
        assert_eq!(verdict.required_sources, 1);
        assert_eq!(verdict.confidence, SINGLE_SOURCE_CONFIDENCE);
        assert_eq!(verdict.warnings, vec![ConsistencyWarning::SingleSource]);
        assert_eq!(verdict.reason, None);
    }

    #[test]
    fn test_same_provider_twice_counts_once() {
        let validator = ConsistencyValidator::default();
        let verdict = validator.validate(
            "top 3 dim sum",
            &[src("a", &["Tim Ho Wan"]), src("a", &["Tim Ho Wan"])],
        );
        assert!(!verdict.valid);
    }

    #[test]
    fn test_trend_single_source_is_flagged() {
        let validator = ConsistencyValidator::default();
        let verdict = validator.validate("oversized blazers", &[src("a", &["blazer"])]);
        assert!(verdict.valid);
        assert!(!verdict.is_factual);
        assert_eq!(verdict.confidence, 0.5);
        assert_eq!(verdict.warnings, vec![ConsistencyWarning::SingleSource]);
    }

    #[test]
    fn test_trend_without_sources_is_invalid() {
        let validator = ConsistencyValidator::default();
        let verdict = validator.validate::<String>("oversized blazers", &[src("a", &[])]);
        assert!(!verdict.valid);
    }

    #[test]
    fn test_tokens_split_cjk_per_character() {
        let set = tokens("元朗 Dim-Sum");
        assert!(set.contains("元"));
        assert!(set.contains("朗"));
        assert!(set.contains("dim"));
        assert!(set.contains("sum"));
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn test_sources_needed() {
        let validator = ConsistencyValidator::default();
        assert_eq!(validator.sources_needed("top 10 cafes"), 2);
        assert_eq!(validator.sources_needed("cozy cafes"), 1);
    }
}
