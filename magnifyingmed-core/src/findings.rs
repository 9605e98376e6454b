//! Structured literature findings returned by an analysis provider.
//!
//! A `TopicFindings` is an immutable summary for one analysis axis: a map
//! of named summary fields plus the citations and studies that back them.
//! Provider output is arbitrary JSON, so `TopicFindings::from_json` never
//! fails; malformed input normalises to an empty structure.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Well-known summary field names.
pub mod fields {
    pub const TOTAL_DATASETS: &str = "total_datasets";
    pub const DATASETS_WITH_RACE_LABELS: &str = "datasets_with_race_labels";
    pub const AVG_DARK_SKIN_PROPORTION: &str = "avg_dark_skin_proportion";
    pub const AVG_MINORITY_REPRESENTATION: &str = "avg_minority_representation";
    pub const GEOGRAPHIC_DIVERSITY: &str = "geographic_diversity";
    pub const TOTAL_STUDIES: &str = "total_studies";
    pub const STUDIES_WITH_SUBGROUP_METRICS: &str = "studies_with_subgroup_metrics";
    pub const NO_SUBGROUP_REPORTING: &str = "no_subgroup_reporting";
    pub const AVG_PERFORMANCE_GAP: &str = "avg_performance_gap";
    pub const STUDIES_WITH_FAIRNESS_METHODS: &str = "studies_with_fairness_methods";
    pub const STUDIES_WITH_EXTERNAL_VALIDATION: &str = "studies_with_external_validation";
    pub const VALIDATION_GEOGRAPHIC_DIVERSITY: &str = "validation_geographic_diversity";
}

/// One analysis axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Dataset composition (race labels, skin tone, geography).
    Dataset,
    /// Subgroup performance reporting.
    Subgroup,
    /// Fairness mitigation and external validation.
    Mitigation,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::Dataset, Topic::Subgroup, Topic::Mitigation];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Dataset => "dataset",
            Topic::Subgroup => "subgroup",
            Topic::Mitigation => "mitigation",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A summary field value: numeric, boolean, or categorical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Flag(bool),
    Text(String),
}

impl FieldValue {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(FieldValue::Number),
            Value::Bool(b) => Some(FieldValue::Flag(*b)),
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            _ => None,
        }
    }
}

/// Literature database a citation was retrieved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    #[serde(rename = "pubmed")]
    PubMed,
    #[serde(rename = "openalex")]
    OpenAlex,
    Arxiv,
    SemanticScholar,
    #[serde(other)]
    Other,
}

impl SourceTag {
    /// Parse a free-form source label ("PubMed", "semantic scholar", ...).
    pub fn from_label(label: &str) -> Self {
        let normalized: String = label
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "pubmed" => SourceTag::PubMed,
            "openalex" => SourceTag::OpenAlex,
            "arxiv" => SourceTag::Arxiv,
            "semanticscholar" => SourceTag::SemanticScholar,
            _ => SourceTag::Other,
        }
    }
}

/// A literature reference backing a finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub source: SourceTag,
}

impl Citation {
    pub fn new(title: impl Into<String>, source: SourceTag) -> Self {
        Self {
            title: title.into(),
            year: None,
            url: None,
            source,
        }
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    fn from_json(value: &Value) -> Option<Self> {
        let title = value.get("title")?.as_str()?.trim();
        if title.is_empty() {
            return None;
        }
        Some(Self {
            title: title.to_string(),
            year: value.get("year").and_then(year_from_json),
            url: non_empty_str(value.get("url")),
            source: value
                .get("source")
                .and_then(Value::as_str)
                .map(SourceTag::from_label)
                .unwrap_or(SourceTag::Other),
        })
    }
}

/// A study reported by the provider, with any fairness methods it applied.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StudyRecord {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub fairness_methods: Vec<String>,
}

impl StudyRecord {
    fn from_json(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        let title = value
            .get("paper")
            .or_else(|| value.get("title"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .trim()
            .to_string();
        let fairness_methods = value
            .get("fairness_methods")
            .and_then(Value::as_array)
            .map(|methods| {
                methods
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            title,
            year: value.get("year").and_then(year_from_json),
            url: non_empty_str(value.get("url")),
            fairness_methods,
        })
    }
}

/// Structured, provider-returned summary of literature evidence for one axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicFindings {
    pub topic: Topic,
    #[serde(default)]
    pub summary: BTreeMap<String, FieldValue>,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub studies: Vec<StudyRecord>,
    /// Set when the provider could not produce real findings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TopicFindings {
    /// Empty findings for a topic; every accessor reads as zero/absent.
    pub fn new(topic: Topic) -> Self {
        Self {
            topic,
            summary: BTreeMap::new(),
            citations: Vec::new(),
            studies: Vec::new(),
            error: None,
        }
    }

    /// Zero-valued findings carrying an error, the shape a provider returns
    /// when it cannot analyse a topic.
    pub fn failed(topic: Topic, message: impl Into<String>) -> Self {
        let mut findings = Self::new(topic);
        let zero_fields: &[&str] = match topic {
            Topic::Dataset => &[fields::TOTAL_DATASETS, fields::DATASETS_WITH_RACE_LABELS],
            Topic::Subgroup => &[
                fields::TOTAL_STUDIES,
                fields::STUDIES_WITH_SUBGROUP_METRICS,
            ],
            Topic::Mitigation => &[
                fields::TOTAL_STUDIES,
                fields::STUDIES_WITH_FAIRNESS_METHODS,
            ],
        };
        for key in zero_fields {
            findings
                .summary
                .insert((*key).to_string(), FieldValue::Number(0.0));
        }
        findings.error = Some(message.into());
        findings
    }

    /// Normalise arbitrary provider JSON into findings.
    ///
    /// Non-object input yields empty findings. The nested
    /// `validation.geographic_diversity` and the top-level
    /// `no_subgroup_reporting` are folded into the summary map.
    pub fn from_json(topic: Topic, value: &Value) -> Self {
        let mut findings = Self::new(topic);
        let Some(root) = value.as_object() else {
            return findings;
        };

        if let Some(summary) = root.get("summary").and_then(Value::as_object) {
            for (key, raw) in summary {
                if let Some(field) = FieldValue::from_json(raw) {
                    findings.summary.insert(key.clone(), field);
                }
            }
        }

        if let Some(field) = root
            .get(fields::NO_SUBGROUP_REPORTING)
            .and_then(FieldValue::from_json)
        {
            findings
                .summary
                .entry(fields::NO_SUBGROUP_REPORTING.to_string())
                .or_insert(field);
        }

        if let Some(diversity) = root
            .get("validation")
            .and_then(|v| v.get(fields::GEOGRAPHIC_DIVERSITY))
            .and_then(Value::as_str)
        {
            findings.summary.insert(
                fields::VALIDATION_GEOGRAPHIC_DIVERSITY.to_string(),
                FieldValue::Text(diversity.to_string()),
            );
        }

        for key in ["citations", "real_papers"] {
            if let Some(items) = root.get(key).and_then(Value::as_array) {
                findings
                    .citations
                    .extend(items.iter().filter_map(Citation::from_json));
            }
        }

        if let Some(items) = root.get("studies").and_then(Value::as_array) {
            findings.studies = items.iter().filter_map(StudyRecord::from_json).collect();
        }

        findings.error = non_empty_str(root.get("error"));
        findings
    }

    pub fn with_number(mut self, key: &str, value: f64) -> Self {
        self.summary
            .insert(key.to_string(), FieldValue::Number(value));
        self
    }

    pub fn with_count(self, key: &str, value: u32) -> Self {
        self.with_number(key, f64::from(value))
    }

    pub fn with_category(mut self, key: &str, value: &str) -> Self {
        self.summary
            .insert(key.to_string(), FieldValue::Text(value.to_string()));
        self
    }

    pub fn with_citation(mut self, citation: Citation) -> Self {
        self.citations.push(citation);
        self
    }

    pub fn with_study(mut self, study: StudyRecord) -> Self {
        self.studies.push(study);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    /// Numeric value of a field. Numeric strings are accepted.
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.summary.get(key)? {
            FieldValue::Number(n) if n.is_finite() => Some(*n),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    /// Non-negative integer count; absent or malformed fields count as zero.
    pub fn count(&self, key: &str) -> u32 {
        self.number(key)
            .map(|n| n.max(0.0).round().min(f64::from(u32::MAX)) as u32)
            .unwrap_or(0)
    }

    /// Categorical value of a field.
    pub fn category(&self, key: &str) -> Option<&str> {
        match self.summary.get(key)? {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.summary.contains_key(key)
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Studies that applied at least one fairness method.
    pub fn studies_with_methods(&self) -> impl Iterator<Item = &StudyRecord> {
        self.studies
            .iter()
            .filter(|study| !study.fairness_methods.is_empty())
    }
}

fn year_from_json(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => s.trim().get(..4).and_then(|y| y.parse().ok()),
        _ => None,
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
