//! Error types for the query router

use thiserror::Error;

/// Result type alias for router operations
pub type Result<T> = std::result::Result<T, RouterError>;

#[derive(Error, Debug)]
pub enum RouterError {

    // =============================
    // Classifier Errors (absorbed)
    // =============================

    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    #[error("Malformed classifier output: {0}")]
    MalformedClassifierOutput(String),

    // =============================
    // Per-query Terminal Errors
    // =============================

    #[error("Could not resolve parameter '{parameter}': {detail}")]
    ParameterResolution { parameter: String, detail: String },

    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    // =============================
    // Configuration Errors
    // =============================

    #[error("No tools discovered from the tool server")]
    RegistryEmpty,

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // Transport Errors
    // =============================

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl RouterError {
    /// Stable machine-readable code surfaced in error results
    pub fn code(&self) -> &'static str {
        match self {
            RouterError::ClassifierUnavailable(_) => "classifier_unavailable",
            RouterError::MalformedClassifierOutput(_) => "malformed_classifier_output",
            RouterError::ParameterResolution { .. } => "parameter_resolution",
            RouterError::ToolExecution { .. } => "tool_execution",
            RouterError::ToolNotFound(_) => "tool_not_found",
            RouterError::RegistryEmpty => "registry_empty",
            RouterError::Config(_) => "config",
            RouterError::Transport(_) => "transport",
            RouterError::Timeout(_) => "timeout",
            RouterError::Protocol(_) => "protocol",
            RouterError::SerializationError(_) => "serialization",
            RouterError::HttpError(_) => "http",
            RouterError::IoError(_) => "io",
        }
    }

    /// Errors that describe a deployment problem rather than a bad query
    pub fn is_configuration(&self) -> bool {
        matches!(self, RouterError::RegistryEmpty | RouterError::Config(_))
    }

    pub fn missing_parameter(parameter: &str, detail: impl Into<String>) -> Self {
        RouterError::ParameterResolution {
            parameter: parameter.to_string(),
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(RouterError::RegistryEmpty.code(), "registry_empty");
        assert_eq!(
            RouterError::missing_parameter("symbol", "symbol not found").code(),
            "parameter_resolution"
        );
        assert_eq!(RouterError::Timeout(3000).code(), "timeout");
    }

    #[test]
    fn test_parameter_error_names_parameter() {
        let err = RouterError::missing_parameter("symbol", "symbol not found");
        assert!(err.to_string().contains("'symbol'"));
        assert!(!err.is_configuration());
        assert!(RouterError::RegistryEmpty.is_configuration());
    }
}
