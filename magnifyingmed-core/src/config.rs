//! Configuration system for MagnifyingMed.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/magnifyingmed/config.toml` and/or
//! `.magnifyingmed/config.toml` in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::scoring::ScoreWeights;
use crate::scoring::aggregator::{DEFAULT_MIN_SOURCES, DEFAULT_THRESHOLD};
use crate::scoring::components::{DEFAULT_DARK_SKIN_TARGET, DEFAULT_MINORITY_TARGET};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

/// Weights, threshold, and representation targets for the bias score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub weights: ScoreWeights,
    /// Scores at or above this are flagged.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Evidence count at which confidence is `high`.
    #[serde(default = "default_min_sources")]
    pub min_sources_for_flag: u32,
    #[serde(default = "default_dark_skin_target")]
    pub target_dark_skin_proportion: f64,
    #[serde(default = "default_minority_target")]
    pub target_minority_representation: f64,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}
fn default_min_sources() -> u32 {
    DEFAULT_MIN_SOURCES
}
fn default_dark_skin_target() -> f64 {
    DEFAULT_DARK_SKIN_TARGET
}
fn default_minority_target() -> f64 {
    DEFAULT_MINORITY_TARGET
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            threshold: DEFAULT_THRESHOLD,
            min_sources_for_flag: DEFAULT_MIN_SOURCES,
            target_dark_skin_proportion: DEFAULT_DARK_SKIN_TARGET,
            target_minority_representation: DEFAULT_MINORITY_TARGET,
        }
    }
}

/// Conversation behaviour and narrative generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Look-back window used when the user names no time range.
    pub default_years: u32,
    /// History entries included in open-ended narrative prompts.
    pub history_summary_messages: usize,
    /// Each history entry is truncated to this many characters in prompts.
    pub history_truncate_chars: usize,
    pub narrative_temperature: f64,
    pub extraction_temperature: f64,
    pub analysis_temperature: f64,
    /// Maximum papers listed in mitigation and paper responses.
    pub max_listed_papers: usize,
    /// Run the three topic analyses concurrently.
    pub concurrent_analysis: bool,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            default_years: 5,
            history_summary_messages: 6,
            history_truncate_chars: 200,
            narrative_temperature: 0.7,
            extraction_temperature: 0.3,
            analysis_temperature: 0.3,
            max_listed_papers: 5,
            concurrent_analysis: true,
        }
    }
}

/// Configuration for the OpenAI-compatible narrative backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    /// Custom base URL (Azure OpenAI, Ollama, vLLM, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Inline API key; takes precedence over `api_key_env` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub max_tokens: usize,
    pub timeout_secs: u64,
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
            max_tokens: 2000,
            timeout_secs: 120,
            system_prompt: "You are an equity-focused biomedical analyst. Always output valid JSON when requested.".to_string(),
        }
    }
}

impl AppConfig {
    /// Return human-readable warnings for suspicious values.
    ///
    /// Weight and threshold invariants are enforced separately when the
    /// aggregator is built; these warnings never block startup.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.conversation.default_years == 0 {
            warnings.push("default_years is 0, analyses will cover no literature".to_string());
        }
        if self.conversation.default_years > 30 {
            warnings.push(format!(
                "default_years is {}; literature this old rarely concerns medical AI",
                self.conversation.default_years
            ));
        }
        for (name, temp) in [
            ("narrative_temperature", self.conversation.narrative_temperature),
            ("extraction_temperature", self.conversation.extraction_temperature),
            ("analysis_temperature", self.conversation.analysis_temperature),
        ] {
            if !(0.0..=2.0).contains(&temp) {
                warnings.push(format!("{name} is {temp}, outside the usual 0.0-2.0 range"));
            }
        }
        if self.conversation.max_listed_papers == 0 {
            warnings.push("max_listed_papers is 0, no papers will be listed".to_string());
        }
        if self.scoring.target_dark_skin_proportion <= 0.0
            || self.scoring.target_minority_representation <= 0.0
        {
            warnings.push(
                "representation targets at or below 0 make every gap score 0".to_string(),
            );
        }

        warnings
    }

    /// Serialize to TOML, the on-disk config format.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
    }
}

/// Load configuration from all sources, merging in priority order.
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&AppConfig>,
) -> Result<AppConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("org", "magnifyingmed", "magnifyingmed")
    {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".magnifyingmed").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (MAGNIFYINGMED_SCORING__THRESHOLD, MAGNIFYINGMED_LLM__MODEL, ...)
    figment = figment.merge(Env::prefixed("MAGNIFYINGMED_").split("__"));

    // Explicit overrides
    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    Ok(figment.extract()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.scoring.threshold, 0.30);
        assert_eq!(config.scoring.min_sources_for_flag, 2);
        assert_eq!(config.scoring.weights.dark_skin_representation, 0.25);
        assert_eq!(config.conversation.default_years, 5);
        assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = AppConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let deserialized: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized.scoring.weights, config.scoring.weights);
        assert_eq!(deserialized.llm.model, config.llm.model);
    }

    #[test]
    fn test_load_config_defaults() {
        let config = load_config(None, None).unwrap();
        assert_eq!(config.conversation.max_listed_papers, 5);
    }

    #[test]
    fn test_load_config_with_overrides() {
        let mut overrides = AppConfig::default();
        overrides.llm.model = "gpt-4o-mini".to_string();
        overrides.scoring.threshold = 0.4;

        let config = load_config(None, Some(&overrides)).unwrap();
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.scoring.threshold, 0.4);
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join(".magnifyingmed");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("config.toml"),
            r#"
[scoring]
threshold = 0.5

[scoring.weights]
race_label_availability = 0.2
dark_skin_representation = 0.2
subgroup_metrics = 0.2
geographic_concentration = 0.15
fairness_method_coverage = 0.15
external_validation = 0.1

[conversation]
default_years = 10
history_summary_messages = 4
history_truncate_chars = 120
narrative_temperature = 0.5
extraction_temperature = 0.2
analysis_temperature = 0.2
max_listed_papers = 3
concurrent_analysis = false
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.scoring.threshold, 0.5);
        assert_eq!(config.scoring.weights.race_label_availability, 0.2);
        assert_eq!(config.conversation.default_years, 10);
        assert!(!config.conversation.concurrent_analysis);
        // Untouched sections keep their defaults.
        assert_eq!(config.llm.max_tokens, 2000);
    }

    #[test]
    fn test_malformed_workspace_config_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join(".magnifyingmed");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("config.toml"),
            "[scoring]\nthreshold = \"high\"\n",
        )
        .unwrap();

        let err = load_config(Some(dir.path()), None).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("threshold"));
    }

    #[test]
    fn test_validate_warns_on_suspicious_values() {
        let mut config = AppConfig::default();
        config.conversation.default_years = 0;
        config.conversation.narrative_temperature = 3.5;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[1].contains("narrative_temperature"));
    }
}
