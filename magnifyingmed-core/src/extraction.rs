//! Structured field extraction from free-text utterances.
//!
//! [`RuleBasedExtractor`] matches a fixed taxonomy of medical fields,
//! conditions, time ranges, and bias aspects. [`ModelFieldExtractor`] is the
//! fallback for the medical field alone and only accepts a canonical field
//! name from the model.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use crate::prompts;
use crate::provider::NarrativeGenerator;

/// The canonical medical fields, in matching priority order.
pub const MEDICAL_FIELDS: [&str; 7] = [
    "dermatology",
    "cardiology",
    "radiology",
    "oncology",
    "pulmonology",
    "ophthalmology",
    "pathology",
];

const FIELD_KEYWORDS: [(&str, &[&str]); 7] = [
    (
        "dermatology",
        &[
            "dermatology",
            "skin",
            "melanoma",
            "acne",
            "eczema",
            "dermatological",
            "skin cancer",
        ],
    ),
    (
        "cardiology",
        &["cardiology", "heart", "cardiovascular", "ecg", "troponin", "cardiac"],
    ),
    (
        "radiology",
        &[
            "radiology",
            "x-ray",
            "xray",
            "ct scan",
            "mri",
            "imaging",
            "radiographic",
        ],
    ),
    ("oncology", &["oncology", "cancer", "tumor", "tumour", "malignancy"]),
    (
        "pulmonology",
        &["pulmonology", "lung", "pneumonia", "respiratory", "pulmonary"],
    ),
    (
        "ophthalmology",
        &["ophthalmology", "eye", "retinal", "retina", "diabetic retinopathy"],
    ),
    ("pathology", &["pathology", "histopathology", "biopsy"]),
];

const CONDITION_KEYWORDS: [(&str, &[&str]); 6] = [
    ("melanoma", &["melanoma", "skin cancer"]),
    (
        "heart disease",
        &[
            "heart disease",
            "cardiovascular disease",
            "cardiac",
            "heart failure",
        ],
    ),
    ("pneumonia", &["pneumonia", "lung infection"]),
    ("acne", &["acne"]),
    ("eczema", &["eczema", "atopic dermatitis"]),
    ("diabetic retinopathy", &["diabetic retinopathy", "retinopathy"]),
];

/// Canonical look-back windows the extractor recognises.
pub const CANONICAL_YEARS: [u32; 3] = [5, 3, 10];

/// "recent", "latest", and "current" map to this window.
pub const RECENT_YEARS: u32 = 3;

pub const ASPECT_DATA_IMBALANCE: &str = "data imbalance";
pub const ASPECT_DIAGNOSTIC_BIAS: &str = "diagnostic bias";
pub const ASPECT_PERFORMANCE_GAPS: &str = "performance gaps";
/// Sentinel meaning every bias aspect was requested.
pub const ASPECT_ALL: &str = "all";

static YEARS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:(?:past|last)\s+(\d{1,2})\b|(\d{1,2})[\s-]*years?\b)")
        .expect("valid years regex")
});

static WORD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-z0-9]+(?:[-'][a-z0-9]+)*").expect("valid word regex")
});

/// Fields recovered from one utterance. All fields are best-effort.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    /// First field whose keywords appear in the utterance.
    pub medical_field: Option<String>,
    /// A canonical field name spelled out as a word, e.g. "cardiology".
    pub named_field: Option<String>,
    pub specific_condition: Option<String>,
    pub time_range_years: Option<u32>,
    pub bias_aspects: Vec<String>,
}

impl ExtractedFields {
    pub fn is_empty(&self) -> bool {
        self.medical_field.is_none()
            && self.specific_condition.is_none()
            && self.time_range_years.is_none()
            && self.bias_aspects.is_empty()
    }
}

/// A strategy for recovering the medical field from an utterance.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Return a canonical medical field, or `None` when nothing matched.
    async fn extract_field(&self, utterance: &str) -> Option<String>;
}

/// Return the canonical spelling when `candidate` names one of the fields.
pub fn canonical_field(candidate: &str) -> Option<&'static str> {
    let normalized = candidate
        .trim()
        .trim_matches(|c: char| c == '.' || c == '"' || c == '\'' || c == '`')
        .to_lowercase();
    MEDICAL_FIELDS.iter().copied().find(|f| *f == normalized)
}

/// Lowercase word tokens of `text`, keeping inner hyphens and apostrophes.
pub fn word_tokens(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    WORD_PATTERN
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Deterministic keyword matcher over the fixed taxonomy.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedExtractor;

impl RuleBasedExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract every structured field the taxonomy can recognise.
    pub fn extract_all(&self, utterance: &str) -> ExtractedFields {
        let lower = utterance.to_lowercase();
        let tokens = word_tokens(&lower);

        let medical_field = FIELD_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
            .map(|(field, _)| (*field).to_string());

        let named_field = MEDICAL_FIELDS
            .iter()
            .find(|field| tokens.iter().any(|t| t == *field))
            .map(|field| (*field).to_string());

        let specific_condition = CONDITION_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
            .map(|(condition, _)| (*condition).to_string());

        let fields = ExtractedFields {
            medical_field,
            named_field,
            specific_condition,
            time_range_years: extract_years(&lower),
            bias_aspects: extract_aspects(&lower),
        };
        debug!(?fields, "Rule-based extraction");
        fields
    }
}

fn extract_years(lower: &str) -> Option<u32> {
    for caps in YEARS_PATTERN.captures_iter(lower) {
        let years = caps
            .get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| m.as_str().parse::<u32>().ok());
        if let Some(years) = years.filter(|y| CANONICAL_YEARS.contains(y)) {
            return Some(years);
        }
    }
    if ["recent", "latest", "current"]
        .iter()
        .any(|k| lower.contains(k))
    {
        return Some(RECENT_YEARS);
    }
    None
}

fn extract_aspects(lower: &str) -> Vec<String> {
    let mut aspects = Vec::new();
    if lower.contains("data imbalance") || lower.contains("data representation") {
        aspects.push(ASPECT_DATA_IMBALANCE.to_string());
    }
    if lower.contains("diagnostic bias") {
        aspects.push(ASPECT_DIAGNOSTIC_BIAS.to_string());
    }
    if lower.contains("performance") && lower.contains("gap") {
        aspects.push(ASPECT_PERFORMANCE_GAPS.to_string());
    }
    aspects
}

#[async_trait]
impl FieldExtractor for RuleBasedExtractor {
    fn name(&self) -> &str {
        "rule-based"
    }

    async fn extract_field(&self, utterance: &str) -> Option<String> {
        self.extract_all(utterance).medical_field
    }
}

/// Asks the narrative model for a single field name.
///
/// Any answer outside [`MEDICAL_FIELDS`] is rejected, as are generator errors.
pub struct ModelFieldExtractor {
    generator: Arc<dyn NarrativeGenerator>,
    temperature: f64,
}

impl ModelFieldExtractor {
    pub fn new(generator: Arc<dyn NarrativeGenerator>, temperature: f64) -> Self {
        Self {
            generator,
            temperature,
        }
    }
}

#[async_trait]
impl FieldExtractor for ModelFieldExtractor {
    fn name(&self) -> &str {
        "model"
    }

    async fn extract_field(&self, utterance: &str) -> Option<String> {
        let prompt = prompts::field_extraction(utterance);
        match self.generator.generate(&prompt, self.temperature).await {
            Ok(answer) => match canonical_field(&answer) {
                Some(field) => {
                    debug!(field, "Model extracted medical field");
                    Some(field.to_string())
                }
                None => {
                    warn!(answer = %answer.trim(), "Rejected model field extraction");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "Model field extraction failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::provider::MockNarrativeGenerator;

    #[test]
    fn test_extracts_field_and_condition() {
        let fields = RuleBasedExtractor::new().extract_all("Any bias in skin cancer detection?");
        assert_eq!(fields.medical_field.as_deref(), Some("dermatology"));
        assert_eq!(fields.specific_condition.as_deref(), Some("melanoma"));
        assert_eq!(fields.named_field, None);
    }

    #[test]
    fn test_first_field_in_taxonomy_order_wins() {
        // "cancer" belongs to oncology but "skin" is checked first.
        let fields = RuleBasedExtractor::new().extract_all("skin cancer and tumor imaging");
        assert_eq!(fields.medical_field.as_deref(), Some("dermatology"));
    }

    #[test]
    fn test_named_field_requires_whole_word() {
        let fields = RuleBasedExtractor::new().extract_all("Now look at cardiology instead");
        assert_eq!(fields.named_field.as_deref(), Some("cardiology"));

        let fields = RuleBasedExtractor::new().extract_all("heart imaging");
        assert_eq!(fields.named_field, None);
    }

    #[test]
    fn test_time_ranges() {
        let extractor = RuleBasedExtractor::new();
        assert_eq!(extractor.extract_all("past 10 years").time_range_years, Some(10));
        assert_eq!(extractor.extract_all("last 3").time_range_years, Some(3));
        assert_eq!(extractor.extract_all("a 5-year window").time_range_years, Some(5));
        assert_eq!(extractor.extract_all("latest work").time_range_years, Some(3));
        // 15 is not a canonical window.
        assert_eq!(extractor.extract_all("15 years of data").time_range_years, None);
        assert_eq!(extractor.extract_all("dermatology").time_range_years, None);
    }

    #[test]
    fn test_bias_aspects() {
        let fields = RuleBasedExtractor::new()
            .extract_all("data representation and performance gaps, maybe diagnostic bias");
        assert_eq!(
            fields.bias_aspects,
            vec![
                ASPECT_DATA_IMBALANCE.to_string(),
                ASPECT_DIAGNOSTIC_BIAS.to_string(),
                ASPECT_PERFORMANCE_GAPS.to_string()
            ]
        );
    }

    #[test]
    fn test_miss_leaves_everything_empty() {
        let fields = RuleBasedExtractor::new().extract_all("hello there");
        assert!(fields.is_empty());
    }

    #[test]
    fn test_canonical_field() {
        assert_eq!(canonical_field(" Radiology.\n"), Some("radiology"));
        assert_eq!(canonical_field("\"pathology\""), Some("pathology"));
        assert_eq!(canonical_field("neurology"), None);
        assert_eq!(canonical_field("none"), None);
    }

    #[tokio::test]
    async fn test_model_extractor_accepts_canonical_field() {
        let generator = Arc::new(MockNarrativeGenerator::with_response("Oncology"));
        let extractor = ModelFieldExtractor::new(generator.clone(), 0.3);
        assert_eq!(
            extractor.extract_field("tumours in kids").await.as_deref(),
            Some("oncology")
        );
        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("tumours in kids"));
    }

    #[tokio::test]
    async fn test_model_extractor_rejects_other_output() {
        let generator = Arc::new(MockNarrativeGenerator::with_response("neurology, probably"));
        let extractor = ModelFieldExtractor::new(generator, 0.3);
        assert_eq!(extractor.extract_field("brains").await, None);
    }

    #[tokio::test]
    async fn test_model_extractor_swallows_errors() {
        let generator = Arc::new(MockNarrativeGenerator::new());
        generator.queue_error(ProviderError::Timeout { timeout_secs: 5 });
        let extractor = ModelFieldExtractor::new(generator, 0.3);
        assert_eq!(extractor.extract_field("anything").await, None);
    }
}
