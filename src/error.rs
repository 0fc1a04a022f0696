//! Error types for RagPersona
//!
//! This module defines the error taxonomy used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for RagPersona operations
///
/// Covers persona management, ingestion, retrieval, inference and
/// configuration failures. Variants are grouped by who can fix them, see
/// [`ErrorClass`].
#[derive(Error, Debug)]
pub enum RagPersonaError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The embedding model in use differs from the one a persona's
    /// knowledge base was built with
    #[error(
        "Embedding model mismatch for persona '{persona}': knowledge base uses '{expected}', \
         current configuration uses '{actual}'"
    )]
    ConfigurationMismatch {
        /// Persona whose knowledge base is affected
        persona: String,
        /// Model recorded for the knowledge base
        expected: String,
        /// Model requested by the caller
        actual: String,
    },

    /// A persona with the same (case-insensitive) name already exists
    #[error("Persona '{0}' already exists")]
    DuplicateName(String),

    /// Persona or source lookup failed
    #[error("{kind} '{name}' not found{}", suggestion_suffix(.suggestion))]
    NotFound {
        /// What was being looked up ("Persona", "Source")
        kind: &'static str,
        /// The name that was requested
        name: String,
        /// Closest existing name, if any
        suggestion: Option<String>,
    },

    /// Chunking, embedding or storing a source failed; prior chunks are intact
    #[error("Ingestion failed for source '{source_label}': {message}")]
    IngestionFailure {
        /// Label of the source being ingested
        source_label: String,
        /// What went wrong
        message: String,
    },

    /// The inference collaborator could not be reached or failed mid-stream
    #[error("Inference unavailable: {0}")]
    InferenceUnavailable(String),

    /// The requested model is not installed on the inference server
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// The user interrupted a generation
    #[error("Generation cancelled by user")]
    CancelledGeneration,

    /// The transcript collaborator produced no usable text
    #[error("No transcript available: {0}")]
    NoTranscriptAvailable(String),

    /// Caller supplied invalid arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Persistence errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(" (did you mean '{}'?)", s))
        .unwrap_or_default()
}

impl RagPersonaError {
    /// Build a persona `NotFound` error without a suggestion
    pub fn persona_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Persona",
            name: name.into(),
            suggestion: None,
        }
    }

    /// Build a source `NotFound` error
    pub fn source_not_found(label: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Source",
            name: label.into(),
            suggestion: None,
        }
    }

    /// Attach a "did you mean" suggestion to a `NotFound` error
    pub fn with_suggestion(self, suggestion: Option<String>) -> Self {
        match self {
            Self::NotFound { kind, name, .. } => Self::NotFound {
                kind,
                name,
                suggestion,
            },
            other => other,
        }
    }

    /// Whether a failed inference dispatch is worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::InferenceUnavailable(_))
    }

    /// Classify the error for exit-code purposes
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::DuplicateName(_)
            | Self::NotFound { .. }
            | Self::InvalidInput(_)
            | Self::NoTranscriptAvailable(_)
            | Self::ConfigurationMismatch { .. }
            | Self::Config(_) => ErrorClass::User,
            Self::InferenceUnavailable(_) | Self::ModelNotFound(_) => ErrorClass::Environment,
            _ => ErrorClass::Internal,
        }
    }
}

/// Coarse grouping of failures used for process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The user asked for something that cannot be done as asked
    User,
    /// A collaborator (Ollama) is missing or misbehaving
    Environment,
    /// Anything unexpected
    Internal,
}

impl ErrorClass {
    /// Process exit code for this class
    pub fn exit_code(self) -> u8 {
        match self {
            Self::User => 2,
            Self::Environment => 3,
            Self::Internal => 1,
        }
    }
}

/// Classify an `anyhow::Error` by the innermost `RagPersonaError` in its chain
///
/// The innermost cause wins, so an ingestion failure caused by an
/// unreachable server is still reported as an environment error.
pub fn classify(err: &anyhow::Error) -> ErrorClass {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<RagPersonaError>())
        .last()
        .map(RagPersonaError::class)
        .unwrap_or(ErrorClass::Internal)
}

/// Result type alias for RagPersona operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
