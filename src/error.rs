//! Error types for the advisory core

use thiserror::Error;

/// Result type alias for advisory operations
pub type Result<T> = std::result::Result<T, AdvisorError>;

#[derive(Error, Debug)]
pub enum AdvisorError {

    // =============================
    // Provider Boundary
    // =============================

    /// Rate-limit signal from the provider; recoverable via bounded retry.
    #[error("Provider rate limited: {0}")]
    TransientProvider(String),

    /// Auth, network, or quota failure; never retried.
    #[error("Provider call failed: {0}")]
    FatalProvider(String),

    #[error("Provider still rate limited after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    // =============================
    // Structured-Output Contract
    // =============================

    /// No valid JSON object was recoverable after every repair step.
    /// Carries the offending raw text for diagnosis.
    #[error("Malformed model output: {message}")]
    MalformedOutput { message: String, raw: String },

    /// The output parsed, but the required-field contract was not met.
    #[error("Model output missing required fields: {}", missing.join(", "))]
    SchemaViolation { missing: Vec<String>, raw: String },

    // =============================
    // Orchestration
    // =============================

    #[error("Incomplete preferences: {0}")]
    IncompletePreferences(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Metadata error: {0}")]
    MetadataError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AdvisorError {
    /// The raw provider text attached to a parse or schema failure, when any.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            AdvisorError::MalformedOutput { raw, .. } => Some(raw),
            AdvisorError::SchemaViolation { raw, .. } => Some(raw),
            _ => None,
        }
    }

    /// True only for the rate-limit signal the retry layer may recover from.
    pub fn is_transient(&self) -> bool {
        matches!(self, AdvisorError::TransientProvider(_))
    }
}
