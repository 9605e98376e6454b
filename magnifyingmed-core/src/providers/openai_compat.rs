//! OpenAI-compatible narrative generator.
//!
//! Supports OpenAI, Azure OpenAI, Ollama, vLLM, LM Studio, and any
//! endpoint that follows the OpenAI chat completions API format.

use crate::config::LlmConfig;
use crate::error::ProviderError;
use crate::provider::NarrativeGenerator;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat-completions client that turns one prompt into one reply.
pub struct OpenAiCompatibleGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: usize,
    timeout_secs: u64,
    system_prompt: String,
}

impl std::fmt::Debug for OpenAiCompatibleGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleGenerator")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatibleGenerator {
    /// Create a new generator from configuration.
    ///
    /// Uses `config.api_key` when set, otherwise reads the environment
    /// variable named by `config.api_key_env`.
    pub fn new(config: &LlmConfig) -> Result<Self, ProviderError> {
        let is_local = config
            .base_url
            .as_ref()
            .map(|u| u.contains("localhost") || u.contains("127.0.0.1"))
            .unwrap_or(false);

        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(&config.api_key_env).ok())
            .or_else(|| {
                if is_local {
                    // Local servers (Ollama, vLLM, LM Studio) don't require an API key
                    debug!("No API key set for local endpoint; using dummy bearer token");
                    Some("ollama".to_string())
                } else {
                    None
                }
            })
            .ok_or_else(|| ProviderError::AuthFailed {
                provider: format!(
                    "OpenAI-compatible: env var '{}' not set",
                    config.api_key_env
                ),
            })?;
        Self::new_with_key(config, api_key)
    }

    /// Create a new generator with an explicitly provided API key.
    pub fn new_with_key(config: &LlmConfig, api_key: String) -> Result<Self, ProviderError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::ApiRequest {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
            system_prompt: config.system_prompt.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_body(&self, prompt: &str, temperature: f64) -> Value {
        let mut messages = Vec::new();
        if !self.system_prompt.is_empty() {
            messages.push(json!({"role": "system", "content": self.system_prompt}));
        }
        messages.push(json!({"role": "user", "content": prompt}));
        json!({
            "model": self.model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": self.max_tokens,
            "stream": false,
        })
    }

    /// Extract the reply text from a chat-completions response body.
    fn parse_response(body: &Value) -> Result<String, ProviderError> {
        let choice =
            body.get("choices")
                .and_then(|c| c.get(0))
                .ok_or_else(|| ProviderError::ResponseParse {
                    message: "No choices in response".to_string(),
                })?;

        let content = choice
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::ResponseParse {
                message: "No text content in choice".to_string(),
            })?;

        Ok(content.trim().to_string())
    }

    fn map_http_error(status: reqwest::StatusCode, body: &str) -> ProviderError {
        match status.as_u16() {
            401 => {
                debug!(body = %body, "Authentication failed (401)");
                ProviderError::AuthFailed {
                    provider: "OpenAI-compatible".to_string(),
                }
            }
            429 => {
                // Try to parse retry-after from response
                let retry_secs = serde_json::from_str::<Value>(body)
                    .ok()
                    .and_then(|v| {
                        v.get("error")?
                            .get("message")?
                            .as_str()
                            .map(|s| s.to_string())
                    })
                    .and_then(|msg| {
                        // "Rate limit reached ... try again in 20s"
                        msg.split("in ")
                            .last()
                            .and_then(|s| s.trim().trim_end_matches(['s', '.']).parse::<u64>().ok())
                    })
                    .unwrap_or(5);
                ProviderError::RateLimited {
                    retry_after_secs: retry_secs,
                }
            }
            status if status >= 500 => ProviderError::ApiRequest {
                message: format!("Server error ({}): {}", status, body),
            },
            _ => ProviderError::ApiRequest {
                message: format!("HTTP {}: {}", status, body),
            },
        }
    }

    fn map_transport_error(&self, error: reqwest::Error) -> ProviderError {
        if error.is_timeout() {
            ProviderError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            ProviderError::ApiRequest {
                message: format!("Request failed: {}", error),
            }
        }
    }
}

#[async_trait]
impl NarrativeGenerator for OpenAiCompatibleGenerator {
    async fn generate(&self, prompt: &str, temperature: f64) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(prompt, temperature);

        debug!(url = %url, model = %self.model, temperature, "Sending chat completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &response_body));
        }

        let json: Value =
            serde_json::from_str(&response_body).map_err(|e| ProviderError::ResponseParse {
                message: format!("Invalid JSON: {}", e),
            })?;

        Self::parse_response(&json)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> LlmConfig {
        LlmConfig {
            model: "gpt-4o".to_string(),
            api_key_env: "MAGNIFYINGMED_TEST_OPENAI_KEY".to_string(),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_parse_text_response() {
        let body = json!({
            "choices": [{
                "message": {"role": "assistant", "content": "  Dermatology datasets skew light.  "},
                "finish_reason": "stop"
            }]
        });
        let text = OpenAiCompatibleGenerator::parse_response(&body).unwrap();
        assert_eq!(text, "Dermatology datasets skew light.");
    }

    #[test]
    fn test_parse_response_no_choices() {
        let body = json!({"choices": []});
        let result = OpenAiCompatibleGenerator::parse_response(&body);
        assert!(matches!(result, Err(ProviderError::ResponseParse { .. })));
    }

    #[test]
    fn test_parse_response_null_content() {
        let body = json!({"choices": [{"message": {"content": null}}]});
        assert!(OpenAiCompatibleGenerator::parse_response(&body).is_err());
    }

    #[test]
    fn test_http_error_mapping_401() {
        let err = OpenAiCompatibleGenerator::map_http_error(
            reqwest::StatusCode::UNAUTHORIZED,
            "Unauthorized",
        );
        match err {
            ProviderError::AuthFailed { .. } => {}
            other => panic!("Expected AuthFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_http_error_mapping_429() {
        let err = OpenAiCompatibleGenerator::map_http_error(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"message":"Rate limit reached, please try again in 20s"}}"#,
        );
        assert_eq!(
            err,
            ProviderError::RateLimited {
                retry_after_secs: 20
            }
        );

        let err = OpenAiCompatibleGenerator::map_http_error(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"message":"Rate limit exceeded"}}"#,
        );
        assert_eq!(err, ProviderError::RateLimited { retry_after_secs: 5 });
    }

    #[test]
    fn test_http_error_mapping_500() {
        let err = OpenAiCompatibleGenerator::map_http_error(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
        );
        match err {
            ProviderError::ApiRequest { message } => {
                assert!(message.contains("500"));
            }
            other => panic!("Expected ApiRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_request_body_includes_system_prompt() {
        let generator =
            OpenAiCompatibleGenerator::new_with_key(&test_config(), "sk-test".into()).unwrap();
        let body = generator.request_body("Summarise", 0.3);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Summarise");
        assert_eq!(body["temperature"], 0.3);
    }

    #[test]
    fn test_inline_key_wins_over_env() {
        let mut config = test_config();
        config.api_key_env = "MAGNIFYINGMED_TEST_KEY_NEVER_SET".to_string();
        config.api_key = Some("sk-inline".to_string());
        assert!(OpenAiCompatibleGenerator::new(&config).is_ok());
    }

    #[test]
    fn test_new_missing_key() {
        // SAFETY: test-only env var manipulation
        unsafe { std::env::remove_var("MAGNIFYINGMED_TEST_OPENAI_KEY_MISSING") };
        let mut config = test_config();
        config.api_key_env = "MAGNIFYINGMED_TEST_OPENAI_KEY_MISSING".to_string();
        let result = OpenAiCompatibleGenerator::new(&config);
        assert!(matches!(result, Err(ProviderError::AuthFailed { .. })));
    }

    #[test]
    fn test_local_endpoint_no_api_key_required() {
        let mut config = test_config();
        config.api_key_env = "MAGNIFYINGMED_TEST_LOCAL_KEY_NEVER_SET".to_string();
        config.base_url = Some("http://localhost:11434/v1/".to_string());
        let generator = OpenAiCompatibleGenerator::new(&config).unwrap();
        assert_eq!(generator.base_url(), "http://localhost:11434/v1");
        assert_eq!(generator.model_name(), "gpt-4o");
    }
}
