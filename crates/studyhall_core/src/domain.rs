//! crates/studyhall_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any backend or storage implementation;
//! the persisted ones carry serde derives so callers can round-trip them
//! through a JSON key-value store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

//=========================================================================================
// Document Processing
//=========================================================================================

/// One file handed to the document processor: a name with a dotted extension
/// plus its raw bytes. The byte length doubles as the file size.
#[derive(Debug, Clone)]
pub struct FileInput {
    pub name: String,
    pub bytes: bytes::Bytes,
}

impl FileInput {
    pub fn new(name: impl Into<String>, bytes: impl Into<bytes::Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// The lowercased extension after the last dot, or "unknown".
    pub fn file_type(&self) -> String {
        match self.name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => ext.to_lowercase(),
            _ => "unknown".to_string(),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Extraction details attached to a `ProcessingResult`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slide_count: Option<usize>,
    pub is_image_based: bool,
    pub ocr_used: bool,
}

/// The outcome of extracting (and optionally quizzing) one file.
///
/// Created fresh per file by the processor and immutable once returned.
/// Text-extraction success and quiz-generation success are independent:
/// a failed quiz leaves `success` untouched and records `quiz_error` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub text: String,
    pub word_count: usize,
    pub processing_time_ms: u64,
    pub file_type: String,
    pub file_name: String,
    pub file_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz: Option<Vec<QuizQuestion>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz_error: Option<String>,
    pub metadata: DocumentMetadata,
}

/// Aggregate outcome of a sequential batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProcessingResult {
    pub results: Vec<ProcessingResult>,
    pub total_files: usize,
    pub successful_files: usize,
    pub failed_files: usize,
    pub total_processing_time_ms: u64,
}

//=========================================================================================
// Quiz
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionKind {
    #[serde(rename = "mcq")]
    Mcq,
    #[serde(rename = "true_false")]
    TrueFalse,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

/// A correct answer is an option's text for multiple choice, or a boolean
/// for true/false. Untagged so it deserializes straight from model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorrectAnswer {
    Bool(bool),
    Text(String),
}

/// One validated quiz question.
///
/// Invariant: `Mcq` questions carry exactly 4 options and a `Text` answer
/// matching one of them; `TrueFalse` questions carry no options and a `Bool`
/// answer. Questions are produced by the response parser and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(rename = "correctAnswer")]
    pub correct_answer: CorrectAnswer,
    pub explanation: String,
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionTypeMix {
    Mcq,
    TrueFalse,
    #[default]
    Mixed,
}

/// Knobs for one quiz-generation call. Pure value object, replaced wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizOptions {
    pub num_questions: usize,
    pub difficulty: Difficulty,
    pub question_type: QuestionTypeMix,
}

impl Default for QuizOptions {
    fn default() -> Self {
        Self {
            num_questions: 5,
            difficulty: Difficulty::Medium,
            question_type: QuestionTypeMix::Mixed,
        }
    }
}

/// Per-call processing knobs.
#[derive(Debug, Clone, Default)]
pub struct ProcessingOptions {
    pub generate_quiz: bool,
    pub quiz_options: QuizOptions,
}

//=========================================================================================
// Chat
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Document,
    Image,
}

/// A document or image made available to one chat session. Owned exclusively
/// by the session that holds it and removable by identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatAttachment {
    pub id: String,
    pub name: String,
    pub kind: AttachmentKind,
    pub size: usize,
    /// Extracted text, used for context injection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One conversation turn. Immutable once appended to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<ChatAttachment>>,
}

/// A persisted conversation plus its attached documents.
///
/// Invariant: `updated_at` advances on every mutation (message append,
/// document add/remove).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    /// Session-specific documents.
    pub documents: Vec<ChatAttachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub model: String,
}

/// Chat tuning knobs. Pure value object, compared and replaced wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub selected_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_prompt: String,
    pub enable_document_context: bool,
    /// Percentage of the model's context window the builder may occupy.
    pub context_limit_percent: u32,
}

//=========================================================================================
// Text Generation Requests
//=========================================================================================

/// One message handed to a text-generation backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: ChatRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Everything a text-generation backend needs for one completion call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub messages: Vec<PromptMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}
