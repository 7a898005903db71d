//! services/engine/src/config.rs
//!
//! Defines the engine's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub log_level: Level,
    /// Text-generation backend (Groq or any OpenAI-compatible endpoint).
    pub groq_api_key: Option<String>,
    pub groq_base_url: String,
    /// Vision/OCR backend (Mistral or any OpenAI-compatible endpoint).
    pub mistral_api_key: Option<String>,
    pub mistral_base_url: String,
    pub quiz_model: String,
    pub ocr_model: String,
    pub chat_model: String,
    /// Where the file-backed session store keeps its JSON snapshot.
    pub sessions_path: PathBuf,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load API Keys (as optional) ---
        let groq_api_key = std::env::var("GROQ_API_KEY").ok();
        let mistral_api_key = std::env::var("MISTRAL_API_KEY").ok();

        let groq_base_url = std::env::var("GROQ_BASE_URL")
            .unwrap_or_else(|_| "https://api.groq.com/openai/v1".to_string());
        let mistral_base_url = std::env::var("MISTRAL_BASE_URL")
            .unwrap_or_else(|_| "https://api.mistral.ai/v1".to_string());

        // --- Load Adapter-specific Settings ---
        let quiz_model = std::env::var("QUIZ_MODEL")
            .unwrap_or_else(|_| "llama-3.3-70b-versatile".to_string());
        let ocr_model =
            std::env::var("OCR_MODEL").unwrap_or_else(|_| "pixtral-12b-2409".to_string());
        let chat_model =
            std::env::var("CHAT_MODEL").unwrap_or_else(|_| "llama-3.1-8b-instant".to_string());

        let sessions_path = std::env::var("SESSIONS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./chat_sessions.json"));

        Ok(Self {
            log_level,
            groq_api_key,
            groq_base_url,
            mistral_api_key,
            mistral_base_url,
            quiz_model,
            ocr_model,
            chat_model,
            sessions_path,
        })
    }
}
