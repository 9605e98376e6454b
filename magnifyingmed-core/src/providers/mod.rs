//! Concrete collaborator implementations.
//!
//! - [`OpenAiCompatibleGenerator`]: narrative generation over OpenAI-compatible
//!   chat completions (OpenAI, Azure, Ollama, vLLM, LM Studio)
//! - [`LlmAnalysisProvider`]: per-topic findings extracted from the same model
//!
//! Use [`create_collaborators()`] to build both from config.

pub mod llm_analysis;
pub mod openai_compat;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::ProviderError;
use crate::provider::{AnalysisProvider, NarrativeGenerator};

pub use llm_analysis::{LlmAnalysisProvider, extract_json_object};
pub use openai_compat::OpenAiCompatibleGenerator;

/// Build the live narrative generator and an analysis provider that shares it.
pub fn create_collaborators(
    config: &AppConfig,
) -> Result<(Arc<dyn AnalysisProvider>, Arc<dyn NarrativeGenerator>), ProviderError> {
    let generator: Arc<dyn NarrativeGenerator> =
        Arc::new(OpenAiCompatibleGenerator::new(&config.llm)?);
    let provider: Arc<dyn AnalysisProvider> = Arc::new(LlmAnalysisProvider::new(
        generator.clone(),
        config.conversation.analysis_temperature,
    ));
    tracing::info!(model = %generator.model_name(), "Created live collaborators");
    Ok((provider, generator))
}
