//! services/engine/src/error.rs
//!
//! Defines the primary error type for the entire engine.

use crate::config::ConfigError;
use crate::quiz::parser::QuizParseError;
use studyhall_core::ports::PortError;

/// The primary error type for the `engine` library.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// The requested chat session does not exist in the store.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The assembled prompt plus the new user message would not fit the
    /// configured share of the model's context window.
    #[error("Context limit exceeded. Please start a new chat session or reduce document content. Current: {estimated}, Limit: {limit} tokens.")]
    ContextLimitExceeded { estimated: usize, limit: usize },

    /// The source text is too short to generate a meaningful quiz from.
    #[error("Insufficient content for quiz generation")]
    InsufficientContent,

    /// An extraction path needed the vision backend and none is configured.
    #[error("OCR service not available for {0} processing")]
    OcrUnavailable(&'static str),

    /// Defensive guard for extensions that slip past validation.
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// The text-generation backend failed while producing a quiz.
    #[error("Failed to generate quiz: {0}")]
    QuizGeneration(String),

    /// The backend answered, but no valid question list could be recovered
    /// from its output even after all repair stages.
    #[error(transparent)]
    QuizParse(#[from] QuizParseError),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// A convenience type alias for `Result<T, EngineError>`.
pub type EngineResult<T> = Result<T, EngineError>;
