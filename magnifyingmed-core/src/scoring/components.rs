//! Per-dimension component scores.
//!
//! Every score is in [0, 1] where higher means more bias risk. Scores are
//! computed only from counts and ratios already present in the findings.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::findings::{TopicFindings, fields};

/// Default target share of dark-skin (Fitzpatrick IV-VI) samples.
pub const DEFAULT_DARK_SKIN_TARGET: f64 = 0.25;
/// Default target share of minority-group samples when skin tone is not reported.
pub const DEFAULT_MINORITY_TARGET: f64 = 0.25;

/// A bias dimension, in fixed declaration order.
///
/// The order is significant: it breaks ties when drivers are ranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    RaceLabelAvailability,
    DarkSkinRepresentation,
    SubgroupMetrics,
    GeographicConcentration,
    FairnessMethodCoverage,
    ExternalValidation,
}

impl Dimension {
    pub const ALL: [Dimension; 6] = [
        Dimension::RaceLabelAvailability,
        Dimension::DarkSkinRepresentation,
        Dimension::SubgroupMetrics,
        Dimension::GeographicConcentration,
        Dimension::FairnessMethodCoverage,
        Dimension::ExternalValidation,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Dimension::RaceLabelAvailability => "race_label_availability",
            Dimension::DarkSkinRepresentation => "dark_skin_representation",
            Dimension::SubgroupMetrics => "subgroup_metrics",
            Dimension::GeographicConcentration => "geographic_concentration",
            Dimension::FairnessMethodCoverage => "fairness_method_coverage",
            Dimension::ExternalValidation => "external_validation",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Dimension::RaceLabelAvailability => "Race label availability",
            Dimension::DarkSkinRepresentation => "Dark skin representation",
            Dimension::SubgroupMetrics => "Subgroup metric reporting",
            Dimension::GeographicConcentration => "Geographic concentration",
            Dimension::FairnessMethodCoverage => "Fairness method coverage",
            Dimension::ExternalValidation => "External validation",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Categorical geographic diversity reported for datasets or validation cohorts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeographicDiversity {
    Low,
    Medium,
    High,
}

impl GeographicDiversity {
    /// Parse a category. Unknown or missing values are treated as `Low`.
    pub fn parse(category: Option<&str>) -> Self {
        match category.map(|c| c.trim().to_ascii_lowercase()).as_deref() {
            Some("high") => GeographicDiversity::High,
            Some("medium") => GeographicDiversity::Medium,
            _ => GeographicDiversity::Low,
        }
    }

    pub fn score(&self) -> f64 {
        match self {
            GeographicDiversity::Low => 1.0,
            GeographicDiversity::Medium => 0.5,
            GeographicDiversity::High => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GeographicDiversity::Low => "low",
            GeographicDiversity::Medium => "medium",
            GeographicDiversity::High => "high",
        }
    }
}

/// Which representation metric the dark-skin dimension was scored from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RepresentationBasis {
    /// Average dark-skin proportion across datasets.
    DarkSkin { actual: f64, target: f64 },
    /// Average minority-group representation (fields without skin-tone data).
    Minority { actual: f64, target: f64 },
    /// Neither metric was reported; scored as zero representation.
    Unreported,
}

/// Pure scoring functions for the six bias dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentScorer {
    dark_skin_target: f64,
    minority_target: f64,
}

impl Default for ComponentScorer {
    fn default() -> Self {
        Self::new(DEFAULT_DARK_SKIN_TARGET, DEFAULT_MINORITY_TARGET)
    }
}

impl ComponentScorer {
    pub fn new(dark_skin_target: f64, minority_target: f64) -> Self {
        Self {
            dark_skin_target,
            minority_target,
        }
    }

    /// Share of datasets without race labels.
    pub fn race_label_availability(&self, dataset: &TopicFindings) -> f64 {
        missing_ratio(
            dataset.count(fields::DATASETS_WITH_RACE_LABELS),
            dataset.count(fields::TOTAL_DATASETS),
        )
    }

    /// Which metric backs the dark-skin dimension for these findings.
    pub fn representation_basis(&self, dataset: &TopicFindings) -> RepresentationBasis {
        if let Some(actual) = dataset.number(fields::AVG_DARK_SKIN_PROPORTION) {
            RepresentationBasis::DarkSkin {
                actual,
                target: self.dark_skin_target,
            }
        } else if let Some(actual) = dataset.number(fields::AVG_MINORITY_REPRESENTATION) {
            RepresentationBasis::Minority {
                actual,
                target: self.minority_target,
            }
        } else {
            RepresentationBasis::Unreported
        }
    }

    /// Relative gap between the representation target and what was observed.
    pub fn dark_skin_representation(&self, dataset: &TopicFindings) -> f64 {
        match self.representation_basis(dataset) {
            RepresentationBasis::DarkSkin { actual, target }
            | RepresentationBasis::Minority { actual, target } => {
                representation_gap(actual, target)
            }
            RepresentationBasis::Unreported => 1.0,
        }
    }

    /// Share of studies that do not report subgroup metrics.
    ///
    /// An explicit positive `no_subgroup_reporting` count takes precedence
    /// over the complement of `studies_with_subgroup_metrics`.
    pub fn subgroup_metrics(&self, subgroup: &TopicFindings) -> f64 {
        let total = subgroup.count(fields::TOTAL_STUDIES);
        if total == 0 {
            return 1.0;
        }
        let no_reporting = subgroup.count(fields::NO_SUBGROUP_REPORTING);
        if no_reporting > 0 {
            clamp_unit(f64::from(no_reporting) / f64::from(total))
        } else {
            missing_ratio(subgroup.count(fields::STUDIES_WITH_SUBGROUP_METRICS), total)
        }
    }

    /// Mean of the dataset and validation geographic-diversity scores.
    pub fn geographic_concentration(
        &self,
        dataset: &TopicFindings,
        mitigation: &TopicFindings,
    ) -> f64 {
        let (dataset_diversity, validation_diversity) =
            Self::geographic_diversity(dataset, mitigation);
        clamp_unit((dataset_diversity.score() + validation_diversity.score()) / 2.0)
    }

    /// Dataset and validation diversity categories, defaulting to `Low`.
    pub fn geographic_diversity(
        dataset: &TopicFindings,
        mitigation: &TopicFindings,
    ) -> (GeographicDiversity, GeographicDiversity) {
        (
            GeographicDiversity::parse(dataset.category(fields::GEOGRAPHIC_DIVERSITY)),
            GeographicDiversity::parse(
                mitigation.category(fields::VALIDATION_GEOGRAPHIC_DIVERSITY),
            ),
        )
    }

    /// Share of studies that apply no fairness method.
    pub fn fairness_method_coverage(&self, mitigation: &TopicFindings) -> f64 {
        missing_ratio(
            mitigation.count(fields::STUDIES_WITH_FAIRNESS_METHODS),
            mitigation.count(fields::TOTAL_STUDIES),
        )
    }

    /// Share of studies without external validation.
    pub fn external_validation(&self, mitigation: &TopicFindings) -> f64 {
        missing_ratio(
            mitigation.count(fields::STUDIES_WITH_EXTERNAL_VALIDATION),
            mitigation.count(fields::TOTAL_STUDIES),
        )
    }

    /// Score a single dimension from the three topic findings.
    pub fn score(
        &self,
        dimension: Dimension,
        dataset: &TopicFindings,
        subgroup: &TopicFindings,
        mitigation: &TopicFindings,
    ) -> f64 {
        match dimension {
            Dimension::RaceLabelAvailability => self.race_label_availability(dataset),
            Dimension::DarkSkinRepresentation => self.dark_skin_representation(dataset),
            Dimension::SubgroupMetrics => self.subgroup_metrics(subgroup),
            Dimension::GeographicConcentration => {
                self.geographic_concentration(dataset, mitigation)
            }
            Dimension::FairnessMethodCoverage => self.fairness_method_coverage(mitigation),
            Dimension::ExternalValidation => self.external_validation(mitigation),
        }
    }
}

/// `1 - with/total`, clamped; an empty population is the worst case.
fn missing_ratio(with: u32, total: u32) -> f64 {
    if total == 0 {
        return 1.0;
    }
    clamp_unit(1.0 - f64::from(with) / f64::from(total))
}

fn representation_gap(actual: f64, target: f64) -> f64 {
    if actual >= target {
        return 0.0;
    }
    if target <= 0.0 {
        return 1.0;
    }
    clamp_unit((target - actual) / target)
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 1.0;
    }
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::findings::Topic;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_race_label_ratio() {
        let scorer = ComponentScorer::default();
        let dataset = TopicFindings::new(Topic::Dataset)
            .with_count(fields::TOTAL_DATASETS, 10)
            .with_count(fields::DATASETS_WITH_RACE_LABELS, 2);
        assert!(approx(scorer.race_label_availability(&dataset), 0.8));
    }

    #[test]
    fn test_zero_totals_score_worst_case() {
        let scorer = ComponentScorer::default();
        let dataset = TopicFindings::new(Topic::Dataset);
        let subgroup = TopicFindings::new(Topic::Subgroup);
        let mitigation = TopicFindings::new(Topic::Mitigation);
        assert_eq!(scorer.race_label_availability(&dataset), 1.0);
        assert_eq!(scorer.subgroup_metrics(&subgroup), 1.0);
        assert_eq!(scorer.fairness_method_coverage(&mitigation), 1.0);
        assert_eq!(scorer.external_validation(&mitigation), 1.0);
    }

    #[test]
    fn test_counts_above_total_clamp_to_zero() {
        let scorer = ComponentScorer::default();
        let mitigation = TopicFindings::new(Topic::Mitigation)
            .with_count(fields::TOTAL_STUDIES, 4)
            .with_count(fields::STUDIES_WITH_FAIRNESS_METHODS, 9);
        assert_eq!(scorer.fairness_method_coverage(&mitigation), 0.0);
    }

    #[test]
    fn test_dark_skin_gap() {
        let scorer = ComponentScorer::default();
        let dataset =
            TopicFindings::new(Topic::Dataset).with_number(fields::AVG_DARK_SKIN_PROPORTION, 0.10);
        assert!(approx(scorer.dark_skin_representation(&dataset), 0.6));

        let met =
            TopicFindings::new(Topic::Dataset).with_number(fields::AVG_DARK_SKIN_PROPORTION, 0.40);
        assert_eq!(scorer.dark_skin_representation(&met), 0.0);
    }

    #[test]
    fn test_dark_skin_falls_back_to_minority() {
        let scorer = ComponentScorer::default();
        let dataset = TopicFindings::new(Topic::Dataset)
            .with_number(fields::AVG_MINORITY_REPRESENTATION, 0.20);
        assert!(matches!(
            scorer.representation_basis(&dataset),
            RepresentationBasis::Minority { .. }
        ));
        assert!(approx(scorer.dark_skin_representation(&dataset), 0.2));
    }

    #[test]
    fn test_dark_skin_unreported_is_worst_case() {
        let scorer = ComponentScorer::default();
        let dataset = TopicFindings::new(Topic::Dataset).with_count(fields::TOTAL_DATASETS, 5);
        assert_eq!(
            scorer.representation_basis(&dataset),
            RepresentationBasis::Unreported
        );
        assert_eq!(scorer.dark_skin_representation(&dataset), 1.0);
    }

    #[test]
    fn test_subgroup_prefers_explicit_no_reporting() {
        let scorer = ComponentScorer::default();
        let subgroup = TopicFindings::new(Topic::Subgroup)
            .with_count(fields::TOTAL_STUDIES, 10)
            .with_count(fields::STUDIES_WITH_SUBGROUP_METRICS, 5)
            .with_count(fields::NO_SUBGROUP_REPORTING, 7);
        assert!(approx(scorer.subgroup_metrics(&subgroup), 0.7));

        let without = TopicFindings::new(Topic::Subgroup)
            .with_count(fields::TOTAL_STUDIES, 10)
            .with_count(fields::STUDIES_WITH_SUBGROUP_METRICS, 5);
        assert!(approx(scorer.subgroup_metrics(&without), 0.5));
    }

    #[test]
    fn test_geographic_average_and_unknown_category() {
        let scorer = ComponentScorer::default();
        let dataset =
            TopicFindings::new(Topic::Dataset).with_category(fields::GEOGRAPHIC_DIVERSITY, "High");
        let mitigation = TopicFindings::new(Topic::Mitigation)
            .with_category(fields::VALIDATION_GEOGRAPHIC_DIVERSITY, "medium");
        assert!(approx(scorer.geographic_concentration(&dataset, &mitigation), 0.25));

        let unknown = TopicFindings::new(Topic::Dataset)
            .with_category(fields::GEOGRAPHIC_DIVERSITY, "global-ish");
        let empty = TopicFindings::new(Topic::Mitigation);
        assert_eq!(scorer.geographic_concentration(&unknown, &empty), 1.0);
    }

    #[test]
    fn test_dimension_order_and_keys() {
        let keys: Vec<&str> = Dimension::ALL.iter().map(Dimension::key).collect();
        assert_eq!(
            keys,
            vec![
                "race_label_availability",
                "dark_skin_representation",
                "subgroup_metrics",
                "geographic_concentration",
                "fairness_method_coverage",
                "external_validation",
            ]
        );
        assert!(Dimension::RaceLabelAvailability < Dimension::ExternalValidation);
    }
}
