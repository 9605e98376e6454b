//! Analysis provider backed by a narrative model.
//!
//! Each topic gets a JSON-extraction prompt. The reply is stripped of code
//! fences, the outermost JSON object is parsed, and the result is
//! normalised through [`TopicFindings::from_json`]. Any failure comes back
//! as [`TopicFindings::failed`] so the caller always receives a
//! well-formed value.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::findings::{Topic, TopicFindings};
use crate::prompts;
use crate::provider::{AnalysisProvider, NarrativeGenerator};

pub struct LlmAnalysisProvider {
    generator: Arc<dyn NarrativeGenerator>,
    temperature: f64,
}

impl LlmAnalysisProvider {
    pub fn new(generator: Arc<dyn NarrativeGenerator>, temperature: f64) -> Self {
        Self {
            generator,
            temperature,
        }
    }
}

/// Drop a surrounding ```json fence if present.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse the outermost `{...}` object in a model reply.
pub fn extract_json_object(text: &str) -> Result<Value, ProviderError> {
    let body = strip_code_fence(text);
    let start = body.find('{');
    let end = body.rfind('}');
    let (Some(start), Some(end)) = (start, end) else {
        return Err(ProviderError::ResponseParse {
            message: "No JSON object in model reply".to_string(),
        });
    };
    if end < start {
        return Err(ProviderError::ResponseParse {
            message: "Unbalanced JSON object in model reply".to_string(),
        });
    }
    serde_json::from_str(&body[start..=end]).map_err(|e| ProviderError::ResponseParse {
        message: format!("Invalid JSON: {}", e),
    })
}

#[async_trait]
impl AnalysisProvider for LlmAnalysisProvider {
    async fn analyze(
        &self,
        topic: Topic,
        scope: &str,
        years: u32,
    ) -> Result<TopicFindings, ProviderError> {
        let prompt = prompts::topic_analysis(topic, scope, years);
        let reply = match self.generator.generate(&prompt, self.temperature).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(%topic, error = %e, "Topic analysis request failed");
                return Ok(TopicFindings::failed(topic, e.to_string()));
            }
        };

        match extract_json_object(&reply) {
            Ok(value) => {
                let findings = TopicFindings::from_json(topic, &value);
                debug!(
                    %topic,
                    fields = findings.summary.len(),
                    citations = findings.citations.len(),
                    "Parsed topic findings"
                );
                Ok(findings)
            }
            Err(e) => {
                warn!(%topic, error = %e, "Could not parse topic findings");
                Ok(TopicFindings::failed(topic, e.to_string()))
            }
        }
    }

    fn name(&self) -> &str {
        "llm"
    }
}
