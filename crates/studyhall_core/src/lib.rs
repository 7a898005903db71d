pub mod domain;
pub mod ports;

pub use domain::{
    AttachmentKind, BatchProcessingResult, ChatAttachment, ChatConfig, ChatMessage, ChatRole,
    ChatSession, CorrectAnswer, Difficulty, DocumentMetadata, FileInput, GenerationRequest,
    ProcessingOptions, ProcessingResult, PromptMessage, QuestionKind, QuestionTypeMix,
    QuizOptions, QuizQuestion,
};
pub use ports::{
    PortError, PortResult, SessionStore, TextDeltaStream, TextGenerationService,
    VisionOcrService,
};
