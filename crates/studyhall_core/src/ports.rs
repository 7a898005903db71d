//! crates/studyhall_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the hosted backends (text generation, vision OCR) and of
//! whatever key-value store the caller persists chat sessions in.

use crate::domain::{ChatSession, GenerationRequest};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., HTTP clients).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// A finite sequence of text deltas produced by a streaming completion call.
pub type TextDeltaStream = Pin<Box<dyn Stream<Item = PortResult<String>> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait TextGenerationService: Send + Sync {
    /// Runs a single non-streaming completion and returns the full text.
    async fn complete(&self, request: GenerationRequest) -> PortResult<String>;

    /// Runs a streaming completion, yielding text deltas in arrival order.
    async fn complete_streaming(&self, request: GenerationRequest)
        -> PortResult<TextDeltaStream>;

    /// Cheap connectivity check against the backend.
    async fn probe(&self) -> PortResult<bool>;
}

#[async_trait]
pub trait VisionOcrService: Send + Sync {
    /// Reads the text out of a raster image (or a whole scanned document).
    async fn extract_text(&self, image_bytes: &[u8]) -> PortResult<String>;

    /// Cheap connectivity check against the backend.
    async fn probe(&self) -> PortResult<bool>;
}

/// Caller-owned persisted store for chat sessions, keyed by session id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn list(&self) -> PortResult<Vec<ChatSession>>;

    /// Returns `PortError::NotFound` when no session has the given id.
    async fn get(&self, session_id: &str) -> PortResult<ChatSession>;

    async fn put(&self, session: &ChatSession) -> PortResult<()>;

    async fn delete(&self, session_id: &str) -> PortResult<()>;
}
