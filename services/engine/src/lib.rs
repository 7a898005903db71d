//! services/engine/src/lib.rs
//!
//! The document/quiz/chat engine behind the study UI: extracts text from
//! uploaded files, generates quizzes from it, and runs token-budgeted tutor
//! chats with streaming responses. This crate is a library; it owns no
//! listening ports and is driven entirely by the hosting application.

pub mod adapters;
pub mod chat;
pub mod config;
pub mod error;
pub mod extract;
pub mod processing;
pub mod quiz;
pub mod telemetry;

pub use chat::{ChatOrchestrator, ChatStream};
pub use config::{Config, ConfigError};
pub use error::{EngineError, EngineResult};
pub use processing::{BackendProbe, DocumentProcessor};
pub use quiz::{QuizGenerator, QuizParseError};

use crate::adapters::{FileSessionStore, OpenAiTextAdapter, OpenAiVisionAdapter};
use async_openai::{config::OpenAIConfig, Client};
use std::sync::Arc;
use studyhall_core::ports::{TextGenerationService, VisionOcrService};
use tracing::info;

//=========================================================================================
// Engine Facade
//=========================================================================================

/// The wired-up engine: one document processor plus (when a text backend is
/// configured) one chat orchestrator. Built once at application start; all
/// durable state lives in the session store.
pub struct Engine {
    pub processor: DocumentProcessor,
    chat: Option<ChatOrchestrator>,
}

impl Engine {
    /// Wires adapters from configuration.
    ///
    /// Each configured backend gets its own OpenAI-compatible client pointed
    /// at that vendor's base URL. Absent API keys leave the matching
    /// capability unconfigured rather than failing construction: the
    /// processor degrades per call, and `chat()` reports the gap.
    pub async fn from_config(config: &Config) -> EngineResult<Self> {
        let llm: Option<Arc<dyn TextGenerationService>> =
            config.groq_api_key.as_ref().map(|key| {
                let client_config = OpenAIConfig::new()
                    .with_api_key(key.clone())
                    .with_api_base(config.groq_base_url.clone());
                Arc::new(OpenAiTextAdapter::new(
                    Client::with_config(client_config),
                    config.chat_model.clone(),
                )) as Arc<dyn TextGenerationService>
            });

        let ocr: Option<Arc<dyn VisionOcrService>> =
            config.mistral_api_key.as_ref().map(|key| {
                let client_config = OpenAIConfig::new()
                    .with_api_key(key.clone())
                    .with_api_base(config.mistral_base_url.clone());
                Arc::new(OpenAiVisionAdapter::new(
                    Client::with_config(client_config),
                    config.ocr_model.clone(),
                )) as Arc<dyn VisionOcrService>
            });

        info!(
            text_generation = llm.is_some(),
            ocr = ocr.is_some(),
            "engine backends configured"
        );

        let processor = DocumentProcessor::new(ocr, llm.clone(), config.quiz_model.clone());

        let chat = match llm {
            Some(llm) => {
                let store = FileSessionStore::open(&config.sessions_path).await?;
                Some(ChatOrchestrator::new(llm, Arc::new(store)))
            }
            None => None,
        };

        Ok(Self { processor, chat })
    }

    /// The chat orchestrator, or a configuration error when no
    /// text-generation backend was configured.
    pub fn chat(&self) -> EngineResult<&ChatOrchestrator> {
        self.chat.as_ref().ok_or_else(|| {
            EngineError::Internal(
                "Chat requires a text-generation backend; set GROQ_API_KEY".to_string(),
            )
        })
    }
}
