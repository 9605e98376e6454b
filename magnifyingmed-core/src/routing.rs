//! The pure routing step of the conversation.
//!
//! [`route`] maps the current context, the presence of an analysis, and
//! one utterance to the [`Action`] the orchestrator should take. It does no
//! I/O, so the priority order below is testable in isolation:
//!
//! 1. field known, no analysis, no deferral: analyse
//! 2. "all" requested, field known, no analysis: analyse every aspect
//! 3. no field: try the model extractor, else ask for the field
//! 4. classify the intent
//! 5. with an analysis, route follow-ups and unmatched input by topic

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::analysis::AnalysisResult;
use crate::context::ConversationContext;
use crate::intent::{Intent, IntentClassifier, Utterance, is_paper_request};

const DATASET_TOPIC: [&str; 3] = ["data imbalance", "dataset", "race label"];
const PERFORMANCE_TOPIC: [&str; 4] = ["performance", "subgroup", "accuracy", "gap"];
const MITIGATION_TOPIC: [&str; 4] = ["mitigation", "fairness", "method", "solution"];
const REACTION_PHRASES: [&str; 2] = ["concerning", "that's"];
const SELF_HELP_PHRASES: [&str; 2] = ["what can i", "how can i"];
const SELF_HELP_TOPICS: [&str; 3] = ["focus", "study", "reduce"];
const COURTESY_WORDS: [&str; 5] = ["ok", "okay", "thanks", "great", "cool"];
const COURTESY_PHRASES: [&str; 2] = ["thank you", "got it"];

/// What the orchestrator does with one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    PerformAnalysis,
    /// Set the "all" aspect sentinel, then analyse.
    AnalyzeAll,
    /// No field is known; consult the model extractor, else ask.
    ExtractFieldWithModel,
    ListPapers,
    /// Re-present the stored score without calling the provider.
    RecapAnalysis,
    ProvideMitigation,
    ExplainDataset,
    ExplainPerformance,
    /// Canned acknowledgement of a reaction to the findings.
    Acknowledge,
    /// Context-grounded open-ended narrative.
    FollowUpNarrative,
    DefaultMenu,
    /// The user deferred; hold the analysis until they say so.
    AwaitGoAhead,
}

impl Action {
    /// Actions that call the analysis provider.
    pub fn analyzes(&self) -> bool {
        matches!(self, Action::PerformAnalysis | Action::AnalyzeAll)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::PerformAnalysis => "perform_analysis",
            Action::AnalyzeAll => "analyze_all",
            Action::ExtractFieldWithModel => "extract_field_with_model",
            Action::ListPapers => "list_papers",
            Action::RecapAnalysis => "recap_analysis",
            Action::ProvideMitigation => "provide_mitigation",
            Action::ExplainDataset => "explain_dataset",
            Action::ExplainPerformance => "explain_performance",
            Action::Acknowledge => "acknowledge",
            Action::FollowUpNarrative => "follow_up_narrative",
            Action::DefaultMenu => "default_menu",
            Action::AwaitGoAhead => "await_go_ahead",
        };
        write!(f, "{name}")
    }
}

/// The decision for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub action: Action,
    /// Set when the intent classifier ran.
    pub intent: Option<Intent>,
}

impl Route {
    fn direct(action: Action) -> Self {
        Self {
            action,
            intent: None,
        }
    }

    fn classified(intent: Intent, action: Action) -> Self {
        Self {
            action,
            intent: Some(intent),
        }
    }
}

/// Decide the next action. `context` must already hold this utterance's
/// extracted fields and the utterance itself as the last history entry.
pub fn route(
    classifier: &IntentClassifier,
    context: &ConversationContext,
    analysis: Option<&AnalysisResult>,
    utterance: &Utterance,
) -> Route {
    let has_field = context.has_sufficient_context();
    let analyzed = analysis.is_some();

    if has_field && !analyzed && !utterance.is_deferral() {
        return Route::direct(Action::PerformAnalysis);
    }
    if has_field && !analyzed && utterance.requests_all() {
        return Route::direct(Action::AnalyzeAll);
    }
    if !has_field {
        return Route::direct(Action::ExtractFieldWithModel);
    }

    let intent = classifier.classify(utterance);
    let action = match (intent, analyzed) {
        (Intent::AnalysisRequest, true) => Action::RecapAnalysis,
        (Intent::AnalysisRequest, false) => Action::PerformAnalysis,
        (Intent::Affirmation, _) if context.offered_mitigation() => Action::ProvideMitigation,
        // Everything else needs findings, which the user has deferred. A
        // bare "yes" never lands here: it carries no deferral token.
        (_, false) => Action::AwaitGoAhead,
        (Intent::PaperRequest, true) => Action::ListPapers,
        (Intent::MitigationRequest, true) => Action::ProvideMitigation,
        // No offer in the previous turn; the analysis still carries one.
        (Intent::Affirmation, true) => Action::ProvideMitigation,
        (Intent::FollowUp, true) => follow_up_action(utterance),
        (Intent::Unmatched, true) => {
            let courtesy = utterance.has_any_word(&COURTESY_WORDS)
                || utterance.contains_any(&COURTESY_PHRASES);
            if courtesy && !has_topic(utterance) {
                Action::DefaultMenu
            } else {
                follow_up_action(utterance)
            }
        }
    };
    Route::classified(intent, action)
}

fn has_topic(u: &Utterance) -> bool {
    u.contains_any(&DATASET_TOPIC)
        || u.contains_any(&PERFORMANCE_TOPIC)
        || u.contains_any(&MITIGATION_TOPIC)
}

/// Topic routing once an analysis exists.
fn follow_up_action(u: &Utterance) -> Action {
    if u.contains_any(&REACTION_PHRASES) {
        return Action::Acknowledge;
    }
    if u.contains_any(&SELF_HELP_PHRASES) && u.contains_any(&SELF_HELP_TOPICS) {
        return Action::ProvideMitigation;
    }
    if u.contains_any(&DATASET_TOPIC) {
        return Action::ExplainDataset;
    }
    if u.contains_any(&PERFORMANCE_TOPIC) && !is_paper_request(u) {
        return Action::ExplainPerformance;
    }
    if u.contains_any(&MITIGATION_TOPIC) {
        return Action::ProvideMitigation;
    }
    Action::FollowUpNarrative
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::RuleBasedExtractor;
    use crate::findings::{Topic, TopicFindings};
    use crate::scoring::{BiasAggregator, ScoreWeights};

    fn analysis() -> AnalysisResult {
        let aggregator = BiasAggregator::new(ScoreWeights::default(), 0.30).unwrap();
        let d = TopicFindings::new(Topic::Dataset);
        let s = TopicFindings::new(Topic::Subgroup);
        let m = TopicFindings::new(Topic::Mitigation);
        let score = aggregator.aggregate(&d, &s, &m);
        AnalysisResult::new("dermatology", 5, d, s, m, score)
    }

    /// Feed `text` through extraction and history, then route it.
    fn decide(ctx: &mut ConversationContext, analysis: Option<&AnalysisResult>, text: &str) -> Action {
        ctx.add_user(text);
        ctx.apply(&RuleBasedExtractor::new().extract_all(text));
        route(&IntentClassifier::default(), ctx, analysis, &Utterance::new(text)).action
    }

    fn dermatology_context() -> ConversationContext {
        let mut ctx = ConversationContext::new();
        ctx.set_medical_field("dermatology");
        ctx
    }

    #[test]
    fn test_field_in_first_message_analyses_immediately() {
        let mut ctx = ConversationContext::new();
        assert_eq!(
            decide(&mut ctx, None, "I want to analyze dermatology"),
            Action::PerformAnalysis
        );
        assert_eq!(ctx.medical_field.as_deref(), Some("dermatology"));
    }

    #[test]
    fn test_no_field_goes_to_model_extraction() {
        let mut ctx = ConversationContext::new();
        assert_eq!(
            decide(&mut ctx, None, "hello, what can you do?"),
            Action::ExtractFieldWithModel
        );
    }

    #[test]
    fn test_deferral_waits() {
        let mut ctx = ConversationContext::new();
        assert_eq!(
            decide(&mut ctx, None, "cardiology, but not yet"),
            Action::AwaitGoAhead
        );
        assert_eq!(decide(&mut ctx, None, "go ahead"), Action::PerformAnalysis);
    }

    #[test]
    fn test_all_overrides_deferral() {
        let mut ctx = dermatology_context();
        assert_eq!(
            decide(&mut ctx, None, "no, wait, do all of them"),
            Action::AnalyzeAll
        );
    }

    #[test]
    fn test_explicit_analysis_request_with_deferral_token() {
        let mut ctx = dermatology_context();
        assert_eq!(
            decide(&mut ctx, None, "no, what bias gaps are there?"),
            Action::PerformAnalysis
        );
    }

    #[test]
    fn test_analysis_request_with_existing_analysis_recaps() {
        let result = analysis();
        let mut ctx = dermatology_context();
        assert_eq!(
            decide(&mut ctx, Some(&result), "what bias gaps did you find?"),
            Action::RecapAnalysis
        );
    }

    #[test]
    fn test_papers_before_mitigation() {
        let result = analysis();
        let mut ctx = dermatology_context();
        assert_eq!(
            decide(&mut ctx, Some(&result), "show me papers that address this"),
            Action::ListPapers
        );
        assert_eq!(
            decide(&mut ctx, Some(&result), "how do I fix it?"),
            Action::ProvideMitigation
        );
    }

    #[test]
    fn test_affirmation_after_analysis_gives_mitigation() {
        let result = analysis();
        let mut ctx = dermatology_context();
        ctx.add_assistant("I can also provide specific mitigation methods.");
        assert_eq!(decide(&mut ctx, Some(&result), "yes"), Action::ProvideMitigation);
        assert_eq!(decide(&mut ctx, Some(&result), "Sure."), Action::ProvideMitigation);
    }

    #[test]
    fn test_affirmation_without_prior_offer_falls_back_to_analysis() {
        let result = analysis();
        let mut ctx = dermatology_context();
        ctx.add_assistant("3/10 datasets report race labels.");
        ctx.add_user("yes");
        assert!(!ctx.offered_mitigation());

        let route = route(&IntentClassifier::default(), &ctx, Some(&result), &Utterance::new("yes"));
        assert_eq!(route.intent, Some(Intent::Affirmation));
        assert_eq!(route.action, Action::ProvideMitigation);
    }

    #[test]
    fn test_affirmation_checks_previous_turn_for_offer() {
        let result = analysis();
        let mut ctx = dermatology_context();
        ctx.add_assistant("Would you like mitigation methods?");
        ctx.add_user("yeah");
        assert!(ctx.offered_mitigation());

        let route = route(&IntentClassifier::default(), &ctx, Some(&result), &Utterance::new("yeah"));
        assert_eq!(route.action, Action::ProvideMitigation);
    }

    #[test]
    fn test_topic_routing_after_analysis() {
        let result = analysis();
        let mut ctx = dermatology_context();
        let mut go = |text: &str| decide(&mut ctx, Some(&result), text);
        assert_eq!(go("tell me about the dataset problem"), Action::ExplainDataset);
        assert_eq!(go("how bad is subgroup accuracy?"), Action::ExplainPerformance);
        assert_eq!(go("That's concerning"), Action::Acknowledge);
        assert_eq!(go("what can I focus on?"), Action::ProvideMitigation);
        assert_eq!(go("are fairness toolkits common?"), Action::ProvideMitigation);
        assert_eq!(go("why is this the case?"), Action::FollowUpNarrative);
        assert_eq!(go("thanks"), Action::DefaultMenu);
    }

    #[test]
    fn test_requests_without_analysis_wait_for_go_ahead() {
        let mut ctx = dermatology_context();
        assert_eq!(decide(&mut ctx, None, "don't, just list papers"), Action::AwaitGoAhead);
        assert_eq!(decide(&mut ctx, None, "later; how do I reduce it"), Action::AwaitGoAhead);
    }
}
