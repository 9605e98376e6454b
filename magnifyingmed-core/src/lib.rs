//! # MagnifyingMed Core
//!
//! Scoring and conversation-state engine for MagnifyingMed.
//! Computes the Under-Explored Bias Score for a medical field from
//! structured literature findings, and drives the conversation that decides
//! when to analyse, explain, or recommend mitigations.

pub mod analysis;
pub mod config;
pub mod context;
pub mod error;
pub mod extraction;
pub mod findings;
pub mod intent;
pub mod metrics;
pub mod orchestrator;
pub mod prompts;
pub mod provider;
pub mod providers;
pub mod responses;
pub mod routing;
pub mod scoring;

// Re-export commonly used types at the crate root.
pub use analysis::AnalysisResult;
pub use config::{AppConfig, ConversationConfig, LlmConfig, ScoringConfig, load_config};
pub use context::{ConversationContext, ConversationState, HistoryEntry, Role};
pub use error::{ConfigError, MagnifyingMedError, ProviderError, Result, ScoringError};
pub use extraction::{ExtractedFields, FieldExtractor, ModelFieldExtractor, RuleBasedExtractor};
pub use findings::{Citation, FieldValue, SourceTag, StudyRecord, Topic, TopicFindings};
pub use intent::{Intent, IntentClassifier, Utterance};
pub use metrics::{AggregateMetrics, MetricsTracker, SessionMetrics, SessionObserver};
pub use orchestrator::ConversationOrchestrator;
pub use provider::{
    AnalysisProvider, MockAnalysisProvider, MockNarrativeGenerator, NarrativeGenerator,
};
pub use providers::{LlmAnalysisProvider, OpenAiCompatibleGenerator, create_collaborators};
pub use routing::{Action, Route};
pub use scoring::{
    BiasAggregator, ComponentScorer, Confidence, Dimension, ScoreResult, ScoreWeights, Severity,
};
