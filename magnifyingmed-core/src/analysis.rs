//! The outcome of one "perform analysis" transition.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::findings::{Citation, StudyRecord, Topic, TopicFindings};
use crate::scoring::ScoreResult;

/// Three topic findings plus the score derived from them.
///
/// Created once per analysis and superseded, never merged, when the user
/// moves to a different medical field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub scope: String,
    pub years: u32,
    pub dataset: TopicFindings,
    pub subgroup: TopicFindings,
    pub mitigation: TopicFindings,
    pub score: ScoreResult,
    pub completed_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn new(
        scope: impl Into<String>,
        years: u32,
        dataset: TopicFindings,
        subgroup: TopicFindings,
        mitigation: TopicFindings,
        score: ScoreResult,
    ) -> Self {
        Self {
            scope: scope.into(),
            years,
            dataset,
            subgroup,
            mitigation,
            score,
            completed_at: Utc::now(),
        }
    }

    pub fn findings(&self, topic: Topic) -> &TopicFindings {
        match topic {
            Topic::Dataset => &self.dataset,
            Topic::Subgroup => &self.subgroup,
            Topic::Mitigation => &self.mitigation,
        }
    }

    /// Citations across all three topics, de-duplicated by title.
    ///
    /// The first occurrence wins, in dataset, subgroup, mitigation order.
    pub fn unique_citations(&self) -> Vec<&Citation> {
        let mut seen = HashSet::new();
        Topic::ALL
            .iter()
            .flat_map(|topic| self.findings(*topic).citations.iter())
            .filter(|citation| seen.insert(citation.title.to_lowercase()))
            .collect()
    }

    /// Mitigation studies that reported at least one fairness method.
    pub fn papers_with_methods(&self) -> Vec<&StudyRecord> {
        self.mitigation.studies_with_methods().collect()
    }
}
