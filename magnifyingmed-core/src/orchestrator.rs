//! Conversation orchestrator.
//!
//! Owns one session: the conversation context, the current analysis, and
//! the collaborators. Each `handle_message` call extracts fields, routes the
//! utterance, executes the chosen action, and always returns a response.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::analysis::AnalysisResult;
use crate::config::AppConfig;
use crate::context::{ConversationContext, ConversationState};
use crate::error::{ProviderError, Result};
use crate::extraction::{FieldExtractor, ModelFieldExtractor, RuleBasedExtractor};
use crate::findings::{Topic, TopicFindings};
use crate::intent::{IntentClassifier, Utterance};
use crate::metrics::{MetricsTracker, ResponseEvent, SessionMetrics, SessionObserver};
use crate::prompts;
use crate::provider::{AnalysisProvider, NarrativeGenerator};
use crate::responses;
use crate::routing::{self, Action};
use crate::scoring::BiasAggregator;

/// Drives one conversation session.
pub struct ConversationOrchestrator {
    config: AppConfig,
    aggregator: BiasAggregator,
    provider: Arc<dyn AnalysisProvider>,
    generator: Arc<dyn NarrativeGenerator>,
    classifier: IntentClassifier,
    extractor: RuleBasedExtractor,
    /// Tried in order when rule-based extraction found no field.
    field_extractors: Vec<Arc<dyn FieldExtractor>>,
    context: ConversationContext,
    analysis: Option<AnalysisResult>,
    metrics: Arc<MetricsTracker>,
    observers: Vec<Arc<dyn SessionObserver>>,
}

impl ConversationOrchestrator {
    /// Build an orchestrator. Fails if the scoring configuration violates
    /// the weight or threshold invariants.
    pub fn new(
        config: AppConfig,
        provider: Arc<dyn AnalysisProvider>,
        generator: Arc<dyn NarrativeGenerator>,
    ) -> Result<Self> {
        let aggregator = BiasAggregator::from_config(&config.scoring)?;
        let field_extractors: Vec<Arc<dyn FieldExtractor>> = vec![Arc::new(
            ModelFieldExtractor::new(generator.clone(), config.conversation.extraction_temperature),
        )];
        let metrics = Arc::new(MetricsTracker::new());
        let observers: Vec<Arc<dyn SessionObserver>> = vec![metrics.clone()];

        info!(
            provider = provider.name(),
            model = generator.model_name(),
            threshold = aggregator.threshold(),
            "Conversation orchestrator ready"
        );

        Ok(Self {
            config,
            aggregator,
            provider,
            generator,
            classifier: IntentClassifier::default(),
            extractor: RuleBasedExtractor::new(),
            field_extractors,
            context: ConversationContext::new(),
            analysis: None,
            metrics,
            observers,
        })
    }

    pub fn greeting(&self) -> &'static str {
        prompts::GREETING
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis.as_ref()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MetricsTracker> {
        &self.metrics
    }

    pub fn add_observer(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    pub fn state(&self) -> ConversationState {
        if self.analysis.is_some() {
            ConversationState::Analyzed
        } else if self.context.has_sufficient_context() {
            ConversationState::Ready
        } else {
            ConversationState::Gathering
        }
    }

    /// Process one user message and return the assistant's reply.
    pub async fn handle_message(&mut self, message: &str) -> String {
        let started = Instant::now();
        self.context.add_user(message);

        let fields = self.extractor.extract_all(message);
        let update = self.context.apply(&fields);
        if update.field_switched && self.analysis.take().is_some() {
            info!(
                field = self.context.medical_field.as_deref().unwrap_or_default(),
                "Field switched, previous analysis superseded"
            );
            for observer in &self.observers {
                observer.on_reset();
            }
        }

        let utterance = Utterance::new(message);
        let route = routing::route(
            &self.classifier,
            &self.context,
            self.analysis.as_ref(),
            &utterance,
        );
        debug!(
            action = %route.action,
            intent = ?route.intent,
            state = %self.state(),
            "Routed message"
        );

        let response = self.execute(route.action, &utterance).await;
        self.context.add_assistant(response.clone());

        let event = ResponseEvent {
            user_message: message,
            response: &response,
            action: route.action,
            elapsed: started.elapsed(),
        };
        for observer in &self.observers {
            observer.on_response(&event);
        }
        response
    }

    /// Clear the context and analysis. Session metrics keep accumulating.
    pub fn reset(&mut self) {
        self.context.reset();
        self.analysis = None;
        for observer in &self.observers {
            observer.on_reset();
        }
        info!("Conversation reset");
    }

    /// Close the metrics session and return its summary.
    pub fn end_session(&self) -> SessionMetrics {
        self.metrics.end_session()
    }

    async fn execute(&mut self, action: Action, utterance: &Utterance) -> String {
        match action {
            Action::PerformAnalysis => self.perform_analysis().await,
            Action::AnalyzeAll => {
                self.context.select_all_aspects();
                self.perform_analysis().await
            }
            Action::ExtractFieldWithModel => self.extract_field_then_analyze(utterance).await,
            Action::DefaultMenu => prompts::DEFAULT_MENU.to_string(),
            Action::Acknowledge => prompts::REACTION_ACKNOWLEDGEMENT.to_string(),
            Action::AwaitGoAhead => responses::await_go_ahead(&self.context.scope()),
            Action::RecapAnalysis
            | Action::ListPapers
            | Action::ProvideMitigation
            | Action::ExplainDataset
            | Action::ExplainPerformance
            | Action::FollowUpNarrative => {
                if self.analysis.is_none() {
                    return self.perform_analysis().await;
                }
                self.respond_from_analysis(action, utterance).await
            }
        }
    }

    async fn extract_field_then_analyze(&mut self, utterance: &Utterance) -> String {
        for extractor in &self.field_extractors {
            if let Some(field) = extractor.extract_field(utterance.raw()).await {
                debug!(extractor = extractor.name(), %field, "Fallback extraction found field");
                self.context.set_medical_field(field);
                break;
            }
        }
        if !self.context.has_sufficient_context() {
            return prompts::ASK_FOR_FIELD.to_string();
        }
        if utterance.is_deferral() {
            return responses::await_go_ahead(&self.context.scope());
        }
        self.perform_analysis().await
    }

    async fn respond_from_analysis(&self, action: Action, utterance: &Utterance) -> String {
        let Some(analysis) = self.analysis.as_ref() else {
            return prompts::ASK_FOR_FIELD.to_string();
        };
        let conversation = &self.config.conversation;

        match action {
            Action::RecapAnalysis => responses::recap(analysis),
            Action::ExplainDataset => responses::dataset_explainer(
                analysis,
                self.config.scoring.target_dark_skin_proportion,
            ),
            Action::ExplainPerformance => responses::performance_explainer(analysis),
            Action::ListPapers => {
                if let Some(list) = responses::papers_list(analysis, conversation.max_listed_papers)
                {
                    return list;
                }
                let prompt = prompts::paper_suggestions(&analysis.scope, analysis.years);
                self.narrate(&prompt).await.unwrap_or_else(|e| {
                    format!(
                        "I couldn't find papers for {} right now ({e}). Try asking again in a moment.",
                        analysis.scope
                    )
                })
            }
            Action::ProvideMitigation => self.mitigation(analysis, utterance).await,
            _ => {
                let summary = self.context.summary(
                    conversation.history_summary_messages,
                    conversation.history_truncate_chars,
                );
                let prompt = prompts::follow_up(&summary, utterance.raw());
                self.narrate(&prompt).await.unwrap_or_else(|e| {
                    format!("I couldn't answer that right now ({e}).\n\n{}", prompts::DEFAULT_MENU)
                })
            }
        }
    }

    async fn mitigation(&self, analysis: &AnalysisResult, utterance: &Utterance) -> String {
        let question = (!crate::intent::is_affirmation(utterance)).then(|| utterance.raw());
        let prompt = prompts::mitigation(
            &analysis.scope,
            &responses::mitigation_json(analysis),
            question,
        );
        let recommendations = match self.narrate(&prompt).await {
            Ok(text) => text,
            Err(e) => return responses::mitigation_failed(&analysis.scope, &e.to_string()),
        };

        let max = self.config.conversation.max_listed_papers;
        let papers = match responses::mitigation_papers(analysis, max) {
            Some(list) => Some(list),
            None => {
                let prompt = prompts::paper_suggestions(&analysis.scope, analysis.years);
                self.narrate(&prompt)
                    .await
                    .ok()
                    .map(|text| format!("Papers worth looking for:\n{}", text.trim()))
            }
        };
        responses::mitigation_response(&analysis.scope, &recommendations, papers.as_deref())
    }

    async fn narrate(&self, prompt: &str) -> std::result::Result<String, ProviderError> {
        self.generator
            .generate(prompt, self.config.conversation.narrative_temperature)
            .await
            .inspect_err(|e| warn!(error = %e, "Narrative generation failed"))
    }

    async fn run_topics(
        &self,
        scope: &str,
        years: u32,
    ) -> std::result::Result<(TopicFindings, TopicFindings, TopicFindings), ProviderError> {
        let provider = &self.provider;
        let (dataset, subgroup, mitigation) = if self.config.conversation.concurrent_analysis {
            tokio::join!(
                provider.analyze(Topic::Dataset, scope, years),
                provider.analyze(Topic::Subgroup, scope, years),
                provider.analyze(Topic::Mitigation, scope, years),
            )
        } else {
            (
                provider.analyze(Topic::Dataset, scope, years).await,
                provider.analyze(Topic::Subgroup, scope, years).await,
                provider.analyze(Topic::Mitigation, scope, years).await,
            )
        };
        Ok((
            checked(Topic::Dataset, dataset)?,
            checked(Topic::Subgroup, subgroup)?,
            checked(Topic::Mitigation, mitigation)?,
        ))
    }

    async fn perform_analysis(&mut self) -> String {
        let scope = self.context.scope();
        let years = self
            .context
            .time_range(self.config.conversation.default_years);
        info!(%scope, years, provider = self.provider.name(), "Running bias analysis");

        let (dataset, subgroup, mitigation) = match self.run_topics(&scope, years).await {
            Ok(findings) => findings,
            Err(e) => {
                warn!(%scope, error = %e, "Analysis failed");
                return responses::analysis_failed(&scope, &e.to_string());
            }
        };

        let score = self.aggregator.aggregate(&dataset, &subgroup, &mitigation);
        info!(
            %scope,
            years,
            score = score.score,
            flagged = score.flagged,
            confidence = %score.confidence,
            "Analysis complete"
        );
        let result = AnalysisResult::new(scope, years, dataset, subgroup, mitigation, score);

        let findings = responses::findings_parts(
            &result,
            &self.context,
            self.config.scoring.target_dark_skin_proportion,
        );
        let prompt = prompts::analysis_narrative(
            &result.scope,
            years,
            result.score.rounded_score(),
            &responses::analysis_json(&result, &findings),
        );
        let narrative = self.narrate(&prompt).await.ok();
        let response = responses::analysis_response(&result, &findings, narrative.as_deref());

        for observer in &self.observers {
            observer.on_analysis(&result);
        }
        self.analysis = Some(result);
        response
    }
}

/// Treat an `error` field on the findings the same as an `Err`.
fn checked(
    topic: Topic,
    result: std::result::Result<TopicFindings, ProviderError>,
) -> std::result::Result<TopicFindings, ProviderError> {
    let findings = result?;
    match &findings.error {
        Some(message) => Err(ProviderError::Analysis {
            topic,
            message: message.clone(),
        }),
        None => Ok(findings),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MockAnalysisProvider, MockNarrativeGenerator};
    use crate::scoring::ScoreWeights;

    fn orchestrator() -> (ConversationOrchestrator, Arc<MockAnalysisProvider>) {
        let provider = Arc::new(MockAnalysisProvider::demo());
        let generator = Arc::new(MockNarrativeGenerator::with_response("Narrative."));
        let orch =
            ConversationOrchestrator::new(AppConfig::default(), provider.clone(), generator)
                .unwrap();
        (orch, provider)
    }

    #[test]
    fn test_invalid_weights_are_fatal() {
        let mut config = AppConfig::default();
        config.scoring.weights = ScoreWeights {
            dark_skin_representation: 0.9,
            ..ScoreWeights::default()
        };
        let result = ConversationOrchestrator::new(
            config,
            Arc::new(MockAnalysisProvider::new()),
            Arc::new(MockNarrativeGenerator::new()),
        );
        assert!(matches!(
            result,
            Err(crate::error::MagnifyingMedError::Scoring(_))
        ));
    }

    #[test]
    fn test_fallback_extraction_only_asks_the_model() {
        let (orch, _) = orchestrator();
        let names: Vec<&str> = orch.field_extractors.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["model"]);
    }

    #[tokio::test]
    async fn test_state_progression() {
        let (mut orch, provider) = orchestrator();
        assert_eq!(orch.state(), ConversationState::Gathering);

        orch.handle_message("cardiology please, but wait").await;
        assert_eq!(orch.state(), ConversationState::Ready);
        assert_eq!(provider.call_count(), 0);

        orch.handle_message("go ahead and analyze the bias").await;
        assert_eq!(orch.state(), ConversationState::Analyzed);
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_sequential_analysis_calls_topics_in_order() {
        let provider = Arc::new(MockAnalysisProvider::demo());
        let mut config = AppConfig::default();
        config.conversation.concurrent_analysis = false;
        let mut orch = ConversationOrchestrator::new(
            config,
            provider.clone(),
            Arc::new(MockNarrativeGenerator::new()),
        )
        .unwrap();

        orch.handle_message("radiology in the past 10 years").await;
        let calls = provider.calls();
        let topics: Vec<Topic> = calls.iter().map(|c| c.topic).collect();
        assert_eq!(topics, Topic::ALL.to_vec());
        assert!(calls.iter().all(|c| c.years == 10 && c.scope == "radiology"));
    }

    #[tokio::test]
    async fn test_error_field_is_treated_as_failure() {
        let provider = Arc::new(MockAnalysisProvider::demo());
        provider.queue(
            Topic::Subgroup,
            Ok(TopicFindings::failed(Topic::Subgroup, "upstream timeout")),
        );
        let mut orch = ConversationOrchestrator::new(
            AppConfig::default(),
            provider,
            Arc::new(MockNarrativeGenerator::new()),
        )
        .unwrap();

        let reply = orch.handle_message("dermatology").await;
        assert!(reply.starts_with("I encountered an error while analyzing dermatology"));
        assert!(reply.contains("upstream timeout"));
        assert!(orch.analysis().is_none());
    }

    #[tokio::test]
    async fn test_metrics_observe_every_response() {
        let (mut orch, _) = orchestrator();
        orch.handle_message("hello").await;
        orch.handle_message("dermatology").await;
        let metrics = orch.end_session();
        assert_eq!(metrics.total_responses, 2);
    }
}
