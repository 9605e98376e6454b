//! Error types for the MagnifyingMed core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering scoring invariants, collaborator (provider) failures, and
//! configuration.

use crate::findings::Topic;

/// Top-level error type for the MagnifyingMed core library.
#[derive(Debug, thiserror::Error)]
pub enum MagnifyingMedError {
    #[error("Scoring error: {0}")]
    Scoring(#[from] ScoringError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Invariant violations in the scoring configuration.
///
/// These are fatal: an aggregator that fails validation is never built.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    #[error("Weights must sum to 1.0 (tolerance 0.01), got {total}")]
    InvalidWeights { total: f64 },

    #[error("Weight for '{dimension}' must be non-negative, got {weight}")]
    NegativeWeight { dimension: String, weight: f64 },

    #[error("Threshold must be within [0, 1], got {threshold}")]
    InvalidThreshold { threshold: f64 },
}

/// Errors from the external collaborators (analysis provider, narrative generator).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("{topic} analysis failed: {message}")]
    Analysis { topic: Topic, message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::ParseError {
            message: err.to_string(),
        }
    }
}

/// A type alias for results using the top-level `MagnifyingMedError`.
pub type Result<T> = std::result::Result<T, MagnifyingMedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_scoring() {
        let err = MagnifyingMedError::Scoring(ScoringError::InvalidWeights { total: 1.2 });
        assert_eq!(
            err.to_string(),
            "Scoring error: Weights must sum to 1.0 (tolerance 0.01), got 1.2"
        );
    }

    #[test]
    fn test_error_display_provider() {
        let err = MagnifyingMedError::Provider(ProviderError::Analysis {
            topic: Topic::Subgroup,
            message: "upstream closed".into(),
        });
        assert_eq!(
            err.to_string(),
            "Provider error: subgroup analysis failed: upstream closed"
        );
    }

    #[test]
    fn test_error_display_config() {
        let err = MagnifyingMedError::Config(ConfigError::ParseError {
            message: "invalid type".into(),
        });
        assert_eq!(
            err.to_string(),
            "Configuration error: Configuration parse error: invalid type"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: MagnifyingMedError = io_err.into();
        assert!(matches!(err, MagnifyingMedError::Io(_)));
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: MagnifyingMedError = serde_err.into();
        assert!(matches!(err, MagnifyingMedError::Serialization(_)));
    }

    #[test]
    fn test_provider_error_variants() {
        let err = ProviderError::RateLimited {
            retry_after_secs: 60,
        };
        assert_eq!(err.to_string(), "Rate limited by provider, retry after 60s");

        let err = ProviderError::Timeout { timeout_secs: 30 };
        assert_eq!(err.to_string(), "Request timed out after 30s");
    }
}
