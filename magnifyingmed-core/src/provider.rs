//! Collaborator interfaces for the conversation engine.
//!
//! [`AnalysisProvider`] returns structured findings for one topic and
//! [`NarrativeGenerator`] returns free text for a prompt. Only structured
//! findings drive routing; generated prose is never parsed for control
//! decisions. Mock implementations are provided for tests and offline use.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::findings::{Topic, TopicFindings};

/// Returns structured per-topic findings.
///
/// Implementations should report partial failure through
/// [`TopicFindings::error`] rather than an `Err`; both are handled the same
/// way by the orchestrator.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn analyze(
        &self,
        topic: Topic,
        scope: &str,
        years: u32,
    ) -> Result<TopicFindings, ProviderError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "analysis-provider"
    }
}

/// Returns free-text prose for a prompt.
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, temperature: f64) -> Result<String, ProviderError>;

    /// Model identifier, for logs.
    fn model_name(&self) -> &str {
        "unknown"
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One recorded `analyze` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisCall {
    pub topic: Topic,
    pub scope: String,
    pub years: u32,
}

/// A scripted analysis provider.
///
/// Queued results are returned first, per topic; after that the fixed
/// findings for the topic, and finally empty findings.
#[derive(Debug, Default)]
pub struct MockAnalysisProvider {
    fixed: Mutex<HashMap<Topic, TopicFindings>>,
    queued: Mutex<HashMap<Topic, Vec<Result<TopicFindings, ProviderError>>>>,
    calls: Mutex<Vec<AnalysisCall>>,
}

impl MockAnalysisProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always return `findings` for its topic.
    pub fn with_findings(self, findings: TopicFindings) -> Self {
        lock(&self.fixed).insert(findings.topic, findings);
        self
    }

    /// Return `result` from the next call for `topic`.
    pub fn queue(&self, topic: Topic, result: Result<TopicFindings, ProviderError>) {
        lock(&self.queued).entry(topic).or_default().push(result);
    }

    /// Fail the next call for `topic`.
    pub fn fail_next(&self, topic: Topic, message: &str) {
        self.queue(
            topic,
            Err(ProviderError::Analysis {
                topic,
                message: message.to_string(),
            }),
        );
    }

    pub fn calls(&self) -> Vec<AnalysisCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Findings resembling a typical under-served specialty, for demos.
    pub fn demo() -> Self {
        use crate::findings::{Citation, SourceTag, StudyRecord, fields};

        Self::new()
            .with_findings(
                TopicFindings::new(Topic::Dataset)
                    .with_count(fields::TOTAL_DATASETS, 10)
                    .with_count(fields::DATASETS_WITH_RACE_LABELS, 3)
                    .with_number(fields::AVG_DARK_SKIN_PROPORTION, 0.12)
                    .with_category(fields::GEOGRAPHIC_DIVERSITY, "low")
                    .with_citation(
                        Citation::new(
                            "Disparities in dermatology AI performance across skin tones",
                            SourceTag::PubMed,
                        )
                        .with_year(2022),
                    ),
            )
            .with_findings(
                TopicFindings::new(Topic::Subgroup)
                    .with_count(fields::TOTAL_STUDIES, 30)
                    .with_count(fields::STUDIES_WITH_SUBGROUP_METRICS, 9)
                    .with_number(fields::AVG_PERFORMANCE_GAP, 0.12)
                    .with_citation(
                        Citation::new("Skin tone analysis for dermatology classifiers", SourceTag::Arxiv)
                            .with_year(2023),
                    ),
            )
            .with_findings(
                TopicFindings::new(Topic::Mitigation)
                    .with_count(fields::TOTAL_STUDIES, 30)
                    .with_count(fields::STUDIES_WITH_FAIRNESS_METHODS, 4)
                    .with_count(fields::STUDIES_WITH_EXTERNAL_VALIDATION, 3)
                    .with_category(fields::VALIDATION_GEOGRAPHIC_DIVERSITY, "medium")
                    .with_study(StudyRecord {
                        title: "Reweighting skin lesion classifiers for fairness".into(),
                        year: Some(2021),
                        url: None,
                        fairness_methods: vec!["reweighting".into(), "threshold_adjustment".into()],
                    }),
            )
    }
}

#[async_trait]
impl AnalysisProvider for MockAnalysisProvider {
    async fn analyze(
        &self,
        topic: Topic,
        scope: &str,
        years: u32,
    ) -> Result<TopicFindings, ProviderError> {
        lock(&self.calls).push(AnalysisCall {
            topic,
            scope: scope.to_string(),
            years,
        });

        if let Some(queue) = lock(&self.queued).get_mut(&topic) {
            if !queue.is_empty() {
                return queue.remove(0);
            }
        }
        Ok(lock(&self.fixed)
            .get(&topic)
            .cloned()
            .unwrap_or_else(|| TopicFindings::new(topic)))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// A scripted narrative generator that records every prompt.
#[derive(Debug, Default)]
pub struct MockNarrativeGenerator {
    fallback: Option<String>,
    responses: Mutex<Vec<Result<String, ProviderError>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockNarrativeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `text` whenever nothing is queued.
    pub fn with_response(text: &str) -> Self {
        Self {
            fallback: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub fn queue_response(&self, text: &str) {
        lock(&self.responses).push(Ok(text.to_string()));
    }

    pub fn queue_error(&self, error: ProviderError) {
        lock(&self.responses).push(Err(error));
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl NarrativeGenerator for MockNarrativeGenerator {
    async fn generate(&self, prompt: &str, _temperature: f64) -> Result<String, ProviderError> {
        lock(&self.prompts).push(prompt.to_string());
        let mut responses = lock(&self.responses);
        if !responses.is_empty() {
            return responses.remove(0);
        }
        Ok(self
            .fallback
            .clone()
            .unwrap_or_else(|| "I'm a mock narrative generator. No queued responses available.".to_string()))
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::findings::fields;

    #[tokio::test]
    async fn test_mock_provider_queue_then_fixed() {
        let provider = MockAnalysisProvider::new().with_findings(
            TopicFindings::new(Topic::Dataset).with_count(fields::TOTAL_DATASETS, 4),
        );
        provider.fail_next(Topic::Dataset, "boom");

        let first = provider.analyze(Topic::Dataset, "dermatology", 5).await;
        assert!(matches!(first, Err(ProviderError::Analysis { .. })));

        let second = provider.analyze(Topic::Dataset, "dermatology", 5).await.unwrap();
        assert_eq!(second.count(fields::TOTAL_DATASETS), 4);

        let other = provider.analyze(Topic::Subgroup, "dermatology", 3).await.unwrap();
        assert!(other.summary.is_empty());

        let calls = provider.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].years, 3);
    }

    #[tokio::test]
    async fn test_mock_generator_queue_then_fallback() {
        let generator = MockNarrativeGenerator::with_response("fallback");
        generator.queue_response("first");
        generator.queue_error(ProviderError::RateLimited {
            retry_after_secs: 1,
        });

        assert_eq!(generator.generate("a", 0.7).await.unwrap(), "first");
        assert!(generator.generate("b", 0.7).await.is_err());
        assert_eq!(generator.generate("c", 0.7).await.unwrap(), "fallback");
        assert_eq!(generator.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_demo_provider_is_complete() {
        let provider = MockAnalysisProvider::demo();
        for topic in Topic::ALL {
            let findings = provider.analyze(topic, "dermatology", 5).await.unwrap();
            assert!(!findings.summary.is_empty());
            assert!(!findings.is_failed());
        }
    }
}
