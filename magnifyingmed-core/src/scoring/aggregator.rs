//! Weighted aggregation of component scores into the Under-Explored Bias Score.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use super::components::{ComponentScorer, Dimension, RepresentationBasis};
use crate::config::ScoringConfig;
use crate::error::ScoringError;
use crate::findings::{TopicFindings, fields};

/// Maximum allowed deviation of the weight total from 1.0.
pub const WEIGHT_TOLERANCE: f64 = 0.01;
/// Default flagging threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.30;
/// Default evidence count at which confidence becomes `High`.
pub const DEFAULT_MIN_SOURCES: u32 = 2;
/// Component scores must exceed this to be reported as a driver.
pub const DRIVER_MIN_SCORE: f64 = 0.5;
/// At most this many drivers are reported.
pub const MAX_DRIVERS: usize = 3;

/// Per-dimension weights of the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub race_label_availability: f64,
    pub dark_skin_representation: f64,
    pub subgroup_metrics: f64,
    pub geographic_concentration: f64,
    pub fairness_method_coverage: f64,
    pub external_validation: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            race_label_availability: 0.15,
            dark_skin_representation: 0.25,
            subgroup_metrics: 0.20,
            geographic_concentration: 0.15,
            fairness_method_coverage: 0.15,
            external_validation: 0.10,
        }
    }
}

impl ScoreWeights {
    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::RaceLabelAvailability => self.race_label_availability,
            Dimension::DarkSkinRepresentation => self.dark_skin_representation,
            Dimension::SubgroupMetrics => self.subgroup_metrics,
            Dimension::GeographicConcentration => self.geographic_concentration,
            Dimension::FairnessMethodCoverage => self.fairness_method_coverage,
            Dimension::ExternalValidation => self.external_validation,
        }
    }

    pub fn total(&self) -> f64 {
        Dimension::ALL.iter().map(|d| self.get(*d)).sum()
    }

    /// Check that every weight is non-negative and the total is 1.0 ± 0.01.
    pub fn validate(&self) -> Result<(), ScoringError> {
        for dimension in Dimension::ALL {
            let weight = self.get(dimension);
            if !weight.is_finite() || weight < 0.0 {
                return Err(ScoringError::NegativeWeight {
                    dimension: dimension.key().to_string(),
                    weight,
                });
            }
        }
        let total = self.total();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ScoringError::InvalidWeights { total });
        }
        Ok(())
    }
}

/// How much evidence backed a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
        }
    }
}

/// Qualitative band of the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Moderate,
    High,
    Critical,
}

impl Severity {
    pub fn classify(score: f64) -> Self {
        if score >= 0.7 {
            Severity::Critical
        } else if score >= 0.5 {
            Severity::High
        } else if score >= 0.3 {
            Severity::Moderate
        } else {
            Severity::Low
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "Low"),
            Severity::Moderate => write!(f, "Moderate"),
            Severity::High => write!(f, "High"),
            Severity::Critical => write!(f, "Critical"),
        }
    }
}

/// A dimension that materially contributes to the overall score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub dimension: Dimension,
    pub score: f64,
    pub description: String,
}

/// The scored outcome of one analysis. Immutable once computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Exact weighted sum of the breakdown.
    pub score: f64,
    pub threshold: f64,
    pub flagged: bool,
    pub breakdown: BTreeMap<Dimension, f64>,
    pub drivers: Vec<Driver>,
    pub confidence: Confidence,
    /// Datasets plus subgroup studies plus mitigation studies.
    pub evidence_count: u32,
}

impl ScoreResult {
    /// Score rounded to three decimals for display.
    pub fn rounded_score(&self) -> f64 {
        (self.score * 1000.0).round() / 1000.0
    }

    pub fn severity(&self) -> Severity {
        Severity::classify(self.score)
    }

    pub fn component(&self, dimension: Dimension) -> f64 {
        self.breakdown.get(&dimension).copied().unwrap_or(0.0)
    }

    pub fn driver_descriptions(&self) -> Vec<&str> {
        self.drivers.iter().map(|d| d.description.as_str()).collect()
    }
}

/// Combines the six component scores with validated weights.
#[derive(Debug, Clone)]
pub struct BiasAggregator {
    weights: ScoreWeights,
    threshold: f64,
    min_sources: u32,
    scorer: ComponentScorer,
}

impl BiasAggregator {
    /// Build an aggregator, rejecting invalid weights or thresholds.
    pub fn new(weights: ScoreWeights, threshold: f64) -> Result<Self, ScoringError> {
        weights.validate()?;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ScoringError::InvalidThreshold { threshold });
        }
        Ok(Self {
            weights,
            threshold,
            min_sources: DEFAULT_MIN_SOURCES,
            scorer: ComponentScorer::default(),
        })
    }

    pub fn from_config(config: &ScoringConfig) -> Result<Self, ScoringError> {
        let mut aggregator = Self::new(config.weights, config.threshold)?;
        aggregator.min_sources = config.min_sources_for_flag;
        aggregator.scorer = ComponentScorer::new(
            config.target_dark_skin_proportion,
            config.target_minority_representation,
        );
        Ok(aggregator)
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn scorer(&self) -> &ComponentScorer {
        &self.scorer
    }

    /// Component scores for all six dimensions.
    pub fn breakdown(
        &self,
        dataset: &TopicFindings,
        subgroup: &TopicFindings,
        mitigation: &TopicFindings,
    ) -> BTreeMap<Dimension, f64> {
        Dimension::ALL
            .iter()
            .map(|d| (*d, self.scorer.score(*d, dataset, subgroup, mitigation)))
            .collect()
    }

    /// Weighted sum over the fixed dimension table.
    pub fn combine(&self, breakdown: &BTreeMap<Dimension, f64>) -> f64 {
        Dimension::ALL
            .iter()
            .map(|d| breakdown.get(d).copied().unwrap_or(0.0) * self.weights.get(*d))
            .sum()
    }

    pub fn confidence(&self, evidence_count: u32) -> Confidence {
        if evidence_count >= self.min_sources {
            Confidence::High
        } else if evidence_count > 0 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    /// Score three topic findings.
    pub fn aggregate(
        &self,
        dataset: &TopicFindings,
        subgroup: &TopicFindings,
        mitigation: &TopicFindings,
    ) -> ScoreResult {
        let breakdown = self.breakdown(dataset, subgroup, mitigation);
        let score = self.combine(&breakdown);
        let drivers = self.select_drivers(&breakdown, dataset, subgroup, mitigation);
        let evidence_count = dataset
            .count(fields::TOTAL_DATASETS)
            .saturating_add(subgroup.count(fields::TOTAL_STUDIES))
            .saturating_add(mitigation.count(fields::TOTAL_STUDIES));

        debug!(score, evidence_count, drivers = drivers.len(), "Computed bias score");

        ScoreResult {
            score,
            threshold: self.threshold,
            flagged: score >= self.threshold,
            breakdown,
            drivers,
            confidence: self.confidence(evidence_count),
            evidence_count,
        }
    }

    /// Top three dimensions by score, keeping only those above 0.5.
    ///
    /// `sort_by` is stable, so equal scores keep declaration order.
    fn select_drivers(
        &self,
        breakdown: &BTreeMap<Dimension, f64>,
        dataset: &TopicFindings,
        subgroup: &TopicFindings,
        mitigation: &TopicFindings,
    ) -> Vec<Driver> {
        let mut ranked: Vec<(Dimension, f64)> = Dimension::ALL
            .iter()
            .map(|d| (*d, breakdown.get(d).copied().unwrap_or(0.0)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        ranked
            .into_iter()
            .take(MAX_DRIVERS)
            .filter(|(_, score)| *score > DRIVER_MIN_SCORE)
            .map(|(dimension, score)| Driver {
                dimension,
                score,
                description: self.describe(dimension, score, dataset, subgroup, mitigation),
            })
            .collect()
    }

    fn describe(
        &self,
        dimension: Dimension,
        score: f64,
        dataset: &TopicFindings,
        subgroup: &TopicFindings,
        mitigation: &TopicFindings,
    ) -> String {
        let pct = score * 100.0;
        match dimension {
            Dimension::RaceLabelAvailability => {
                let total = dataset.count(fields::TOTAL_DATASETS);
                let with = dataset.count(fields::DATASETS_WITH_RACE_LABELS).min(total);
                if total > 0 {
                    format!(
                        "Missing race labels in {}/{} datasets ({:.0}% missing)",
                        total - with,
                        total,
                        pct
                    )
                } else {
                    "Race labels missing in datasets".to_string()
                }
            }
            Dimension::DarkSkinRepresentation => match self.scorer.representation_basis(dataset)
            {
                RepresentationBasis::DarkSkin { actual, target } => format!(
                    "Dark skin representation only {:.0}% (target: {:.0}%, gap: {:.0}%)",
                    actual * 100.0,
                    target * 100.0,
                    (target - actual) * 100.0
                ),
                RepresentationBasis::Minority { actual, target } => format!(
                    "Minority representation only {:.0}% (target: {:.0}%, gap: {:.0}%)",
                    actual * 100.0,
                    target * 100.0,
                    (target - actual) * 100.0
                ),
                RepresentationBasis::Unreported => {
                    "Underrepresented groups in datasets".to_string()
                }
            },
            Dimension::SubgroupMetrics => {
                let total = subgroup.count(fields::TOTAL_STUDIES);
                let with = subgroup.count(fields::STUDIES_WITH_SUBGROUP_METRICS);
                if total > 0 {
                    format!(
                        "Only {}/{} studies report subgroup metrics ({:.0}% missing)",
                        with, total, pct
                    )
                } else {
                    "Lack of subgroup metric reporting".to_string()
                }
            }
            Dimension::GeographicConcentration => {
                let (data, validation) = ComponentScorer::geographic_diversity(dataset, mitigation);
                format!(
                    "Low geographic diversity: datasets {}, validation {}",
                    data.as_str(),
                    validation.as_str()
                )
            }
            Dimension::FairnessMethodCoverage => {
                let total = mitigation.count(fields::TOTAL_STUDIES);
                let with = mitigation.count(fields::STUDIES_WITH_FAIRNESS_METHODS);
                if total > 0 {
                    format!(
                        "Only {}/{} studies apply fairness methods ({:.0}% missing)",
                        with, total, pct
                    )
                } else {
                    "Lack of fairness method application".to_string()
                }
            }
            Dimension::ExternalValidation => {
                let total = mitigation.count(fields::TOTAL_STUDIES);
                let with = mitigation.count(fields::STUDIES_WITH_EXTERNAL_VALIDATION);
                if total > 0 {
                    format!(
                        "Only {}/{} studies have external validation ({:.0}% missing)",
                        with, total, pct
                    )
                } else {
                    "Lack of external validation".to_string()
                }
            }
        }
    }
}
