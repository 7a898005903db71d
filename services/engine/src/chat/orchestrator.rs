//! services/engine/src/chat/orchestrator.rs
//!
//! Manages chat sessions in the caller-owned store and streams tutor
//! responses. Failures never abandon a turn: a backend error becomes an
//! assistant-role message in the session log, so the log stays the single
//! source of truth for history.

use crate::chat::context::{build_session_context, context_budget, estimate_token_count};
use crate::error::{EngineError, EngineResult};
use chrono::Utc;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use studyhall_core::domain::{
    ChatAttachment, ChatConfig, ChatMessage, ChatRole, ChatSession, GenerationRequest,
    PromptMessage,
};
use studyhall_core::ports::{PortError, SessionStore, TextGenerationService};
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Hard ceiling on response length, regardless of the configured value.
/// Bounds per-turn cost and latency.
const RESPONSE_MAX_TOKENS: u32 = 4096;

/// How many trailing session messages are replayed to the backend.
const HISTORY_WINDOW: usize = 10;

const CHAT_FAILURE_MESSAGE: &str = "Failed to get response from AI model. Please try again.";

/// A finite sequence of response text deltas. Dropping the stream abandons
/// the turn; there is no separate cancellation signal.
pub type ChatStream = Pin<Box<dyn Stream<Item = String> + Send>>;

//=========================================================================================
// The Orchestrator
//=========================================================================================

/// Stateless service over the session store and the text-generation backend.
/// All durable state lives in the store.
#[derive(Clone)]
pub struct ChatOrchestrator {
    llm: Arc<dyn TextGenerationService>,
    store: Arc<dyn SessionStore>,
}

impl ChatOrchestrator {
    pub fn new(llm: Arc<dyn TextGenerationService>, store: Arc<dyn SessionStore>) -> Self {
        Self { llm, store }
    }

    //-------------------------------------------------------------------------------------
    // Session CRUD
    //-------------------------------------------------------------------------------------

    /// Creates and persists a fresh session. An empty title becomes "New Chat".
    pub async fn create_session(&self, title: &str, model: &str) -> EngineResult<ChatSession> {
        let now = Utc::now();
        let session = ChatSession {
            id: Uuid::new_v4().to_string(),
            title: if title.trim().is_empty() {
                "New Chat".to_string()
            } else {
                title.to_string()
            },
            messages: Vec::new(),
            documents: Vec::new(),
            created_at: now,
            updated_at: now,
            model: model.to_string(),
        };

        self.store.put(&session).await?;
        info!(session_id = %session.id, "chat session created");
        Ok(session)
    }

    pub async fn list_sessions(&self) -> EngineResult<Vec<ChatSession>> {
        Ok(self.store.list().await?)
    }

    pub async fn get_session(&self, session_id: &str) -> EngineResult<ChatSession> {
        match self.store.get(session_id).await {
            Ok(session) => Ok(session),
            Err(PortError::NotFound(_)) => {
                Err(EngineError::SessionNotFound(session_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete_session(&self, session_id: &str) -> EngineResult<()> {
        Ok(self.store.delete(session_id).await?)
    }

    //-------------------------------------------------------------------------------------
    // Message and Document Management
    //-------------------------------------------------------------------------------------

    /// Appends a message to the session log and persists the session.
    pub async fn add_message(
        &self,
        session_id: &str,
        role: ChatRole,
        content: &str,
        attachments: Option<Vec<ChatAttachment>>,
    ) -> EngineResult<ChatMessage> {
        append_message(&self.store, session_id, role, content, attachments).await
    }

    pub async fn add_document_to_session(
        &self,
        session_id: &str,
        document: ChatAttachment,
    ) -> EngineResult<()> {
        let mut session = self.get_session(session_id).await?;
        session.documents.push(document);
        session.updated_at = Utc::now();
        Ok(self.store.put(&session).await?)
    }

    pub async fn remove_document_from_session(
        &self,
        session_id: &str,
        document_id: &str,
    ) -> EngineResult<()> {
        let mut session = self.get_session(session_id).await?;
        session.documents.retain(|d| d.id != document_id);
        session.updated_at = Utc::now();
        Ok(self.store.put(&session).await?)
    }

    //-------------------------------------------------------------------------------------
    // Streaming Completion
    //-------------------------------------------------------------------------------------

    /// Sends one user turn and returns the tutor's response as a delta stream.
    ///
    /// The user message is appended and persisted before the budget check, so
    /// a rejected turn still shows up in the session log. Once streaming
    /// starts, backend failures surface as [`CHAT_FAILURE_MESSAGE`] — yielded
    /// to the consumer and persisted as the assistant turn.
    #[instrument(level = "info", skip(self, user_text, config), fields(session_id = %session_id, model = %config.selected_model))]
    pub async fn send_message(
        &self,
        session_id: &str,
        user_text: &str,
        config: &ChatConfig,
    ) -> EngineResult<ChatStream> {
        let session = self.get_session(session_id).await?;

        // Budget the prompt that WOULD be built for this turn: the current
        // context plus the live user message. The message itself is never
        // silently truncated to fit.
        let current_context = build_session_context(&session, config);
        let estimated = estimate_token_count(&format!("{}{}", current_context, user_text));
        let limit = context_budget(&config.selected_model, config.context_limit_percent);

        self.add_message(session_id, ChatRole::User, user_text, None)
            .await?;

        if estimated > limit {
            return Err(EngineError::ContextLimitExceeded { estimated, limit });
        }

        let session = self.get_session(session_id).await?;
        let request = build_generation_request(&session, config);

        let llm = self.llm.clone();
        let store = self.store.clone();
        let session_id = session_id.to_string();

        let deltas = async_stream::stream! {
            match llm.complete_streaming(request).await {
                Ok(mut backend_stream) => {
                    let mut accumulated = String::new();
                    let mut stream_error = None;

                    while let Some(item) = backend_stream.next().await {
                        match item {
                            Ok(chunk) => {
                                accumulated.push_str(&chunk);
                                yield chunk;
                            }
                            Err(e) => {
                                stream_error = Some(e);
                                break;
                            }
                        }
                    }

                    match stream_error {
                        None => {
                            if let Err(e) = append_message(
                                &store,
                                &session_id,
                                ChatRole::Assistant,
                                &accumulated,
                                None,
                            )
                            .await
                            {
                                error!(error = %e, "failed to persist assistant response");
                            }
                        }
                        Some(e) => {
                            error!(error = %e, "chat stream failed mid-response");
                            let _ = append_message(
                                &store,
                                &session_id,
                                ChatRole::Assistant,
                                CHAT_FAILURE_MESSAGE,
                                None,
                            )
                            .await;
                            yield CHAT_FAILURE_MESSAGE.to_string();
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "chat completion call failed");
                    let _ = append_message(
                        &store,
                        &session_id,
                        ChatRole::Assistant,
                        CHAT_FAILURE_MESSAGE,
                        None,
                    )
                    .await;
                    yield CHAT_FAILURE_MESSAGE.to_string();
                }
            }
        };

        Ok(Box::pin(deltas))
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Shared append path, callable from inside the response stream.
async fn append_message(
    store: &Arc<dyn SessionStore>,
    session_id: &str,
    role: ChatRole,
    content: &str,
    attachments: Option<Vec<ChatAttachment>>,
) -> EngineResult<ChatMessage> {
    let mut session = match store.get(session_id).await {
        Ok(session) => session,
        Err(PortError::NotFound(_)) => {
            return Err(EngineError::SessionNotFound(session_id.to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    let message = ChatMessage {
        id: Uuid::new_v4().to_string(),
        role,
        content: content.to_string(),
        timestamp: Utc::now(),
        attachments,
    };

    session.messages.push(message.clone());
    session.updated_at = message.timestamp;
    store.put(&session).await?;

    Ok(message)
}

/// Assembles the backend request: system prompt with optional document
/// digests, plus the last [`HISTORY_WINDOW`] session messages.
fn build_generation_request(session: &ChatSession, config: &ChatConfig) -> GenerationRequest {
    let mut system_content = config.system_prompt.clone();

    if config.enable_document_context && !session.documents.is_empty() {
        system_content
            .push_str("\n\nYou have access to the following documents in this conversation:\n");
        let digests: Vec<String> = session
            .documents
            .iter()
            .map(|doc| {
                let digest: String = doc
                    .content
                    .as_deref()
                    .unwrap_or_default()
                    .chars()
                    .take(500)
                    .collect();
                format!("{}: {}...", doc.name, digest)
            })
            .collect();
        system_content.push_str(&digests.join("\n"));
    }

    let mut messages = vec![PromptMessage::system(system_content)];
    let window_start = session.messages.len().saturating_sub(HISTORY_WINDOW);
    for message in &session.messages[window_start..] {
        messages.push(PromptMessage {
            role: message.role,
            content: message.content.clone(),
        });
    }

    GenerationRequest {
        model: config.selected_model.clone(),
        messages,
        temperature: config.temperature,
        max_tokens: config.max_tokens.min(RESPONSE_MAX_TOKENS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::FileSessionStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use studyhall_core::domain::AttachmentKind;
    use studyhall_core::ports::{PortResult, TextDeltaStream};

    /// Streams canned chunks and records every request it receives.
    struct StreamingLlm {
        chunks: Vec<&'static str>,
        fail_after: Option<usize>,
        fail_call: bool,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl StreamingLlm {
        fn replying(chunks: Vec<&'static str>) -> Self {
            Self {
                chunks,
                fail_after: None,
                fail_call: false,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing_call() -> Self {
            Self {
                chunks: Vec::new(),
                fail_after: None,
                fail_call: true,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing_mid_stream(chunks: Vec<&'static str>, after: usize) -> Self {
            Self {
                chunks,
                fail_after: Some(after),
                fail_call: false,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TextGenerationService for StreamingLlm {
        async fn complete(&self, _request: GenerationRequest) -> PortResult<String> {
            unimplemented!("chat always streams")
        }

        async fn complete_streaming(
            &self,
            request: GenerationRequest,
        ) -> PortResult<TextDeltaStream> {
            self.seen.lock().unwrap().push(request);
            if self.fail_call {
                return Err(PortError::Unexpected("backend unreachable".to_string()));
            }

            let items: Vec<PortResult<String>> = match self.fail_after {
                Some(after) => self
                    .chunks
                    .iter()
                    .take(after)
                    .map(|c| Ok(c.to_string()))
                    .chain(std::iter::once(Err(PortError::Unexpected(
                        "connection reset".to_string(),
                    ))))
                    .collect(),
                None => self.chunks.iter().map(|c| Ok(c.to_string())).collect(),
            };

            Ok(Box::pin(futures::stream::iter(items)))
        }

        async fn probe(&self) -> PortResult<bool> {
            Ok(true)
        }
    }

    fn chat_config() -> ChatConfig {
        ChatConfig {
            selected_model: "llama-3.1-8b-instant".to_string(),
            temperature: 0.7,
            max_tokens: 8192,
            system_prompt: "You are a patient tutor.".to_string(),
            enable_document_context: true,
            context_limit_percent: 80,
        }
    }

    async fn orchestrator_with(
        llm: Arc<StreamingLlm>,
    ) -> (ChatOrchestrator, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::open(dir.path().join("sessions.json"))
            .await
            .unwrap();
        (ChatOrchestrator::new(llm, Arc::new(store)), dir)
    }

    #[tokio::test]
    async fn session_crud_round_trip() {
        let llm = Arc::new(StreamingLlm::replying(vec![]));
        let (orchestrator, _dir) = orchestrator_with(llm).await;

        let session = orchestrator
            .create_session("", "llama-3.1-8b-instant")
            .await
            .unwrap();
        assert_eq!(session.title, "New Chat");

        let before = orchestrator.get_session(&session.id).await.unwrap().updated_at;
        let attachment = ChatAttachment {
            id: "d1".to_string(),
            name: "notes.txt".to_string(),
            kind: AttachmentKind::Document,
            size: 42,
            content: Some("extracted text".to_string()),
            url: None,
        };
        orchestrator
            .add_document_to_session(&session.id, attachment)
            .await
            .unwrap();

        let loaded = orchestrator.get_session(&session.id).await.unwrap();
        assert_eq!(loaded.documents.len(), 1);
        assert!(loaded.updated_at >= before);

        orchestrator
            .remove_document_from_session(&session.id, "d1")
            .await
            .unwrap();
        assert!(orchestrator
            .get_session(&session.id)
            .await
            .unwrap()
            .documents
            .is_empty());

        orchestrator.delete_session(&session.id).await.unwrap();
        assert!(matches!(
            orchestrator.get_session(&session.id).await,
            Err(EngineError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn streams_deltas_and_persists_the_full_exchange() {
        let llm = Arc::new(StreamingLlm::replying(vec!["Osmosis ", "moves ", "water."]));
        let (orchestrator, _dir) = orchestrator_with(llm.clone()).await;
        let session = orchestrator
            .create_session("Bio", "llama-3.1-8b-instant")
            .await
            .unwrap();

        let stream = orchestrator
            .send_message(&session.id, "What is osmosis?", &chat_config())
            .await
            .unwrap();
        let chunks: Vec<String> = stream.collect().await;

        assert_eq!(chunks, vec!["Osmosis ", "moves ", "water."]);

        let log = orchestrator.get_session(&session.id).await.unwrap().messages;
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].role, ChatRole::User);
        assert_eq!(log[0].content, "What is osmosis?");
        assert_eq!(log[1].role, ChatRole::Assistant);
        assert_eq!(log[1].content, "Osmosis moves water.");
    }

    #[tokio::test]
    async fn context_overflow_fails_fast_but_keeps_the_user_turn() {
        let llm = Arc::new(StreamingLlm::replying(vec!["never sent"]));
        let (orchestrator, _dir) = orchestrator_with(llm.clone()).await;
        let session = orchestrator
            .create_session("Crowded", "gemma-7b-it")
            .await
            .unwrap();

        let mut config = chat_config();
        config.selected_model = "gemma-7b-it".to_string();
        config.context_limit_percent = 1; // 81-token budget
        config.system_prompt = "tutor instructions ".repeat(30); // ~143 tokens

        let err = match orchestrator
            .send_message(&session.id, "short question", &config)
            .await
        {
            Ok(_) => panic!("expected send_message to fail with a context-limit error"),
            Err(e) => e,
        };

        assert!(matches!(err, EngineError::ContextLimitExceeded { .. }));
        assert!(err.to_string().starts_with("Context limit exceeded."));
        // No backend call was made...
        assert!(llm.seen.lock().unwrap().is_empty());
        // ...but the user's turn is still in the log.
        let log = orchestrator.get_session(&session.id).await.unwrap().messages;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].content, "short question");
    }

    #[tokio::test]
    async fn backend_call_failure_becomes_an_assistant_message() {
        let llm = Arc::new(StreamingLlm::failing_call());
        let (orchestrator, _dir) = orchestrator_with(llm).await;
        let session = orchestrator
            .create_session("Flaky", "llama-3.1-8b-instant")
            .await
            .unwrap();

        let stream = orchestrator
            .send_message(&session.id, "Hello?", &chat_config())
            .await
            .unwrap();
        let chunks: Vec<String> = stream.collect().await;

        assert_eq!(chunks, vec![CHAT_FAILURE_MESSAGE]);
        let log = orchestrator.get_session(&session.id).await.unwrap().messages;
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].role, ChatRole::Assistant);
        assert_eq!(log[1].content, CHAT_FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn mid_stream_failure_yields_the_error_text_last() {
        let llm = Arc::new(StreamingLlm::failing_mid_stream(
            vec!["partial ", "answer"],
            1,
        ));
        let (orchestrator, _dir) = orchestrator_with(llm).await;
        let session = orchestrator
            .create_session("Flaky", "llama-3.1-8b-instant")
            .await
            .unwrap();

        let stream = orchestrator
            .send_message(&session.id, "Hello?", &chat_config())
            .await
            .unwrap();
        let chunks: Vec<String> = stream.collect().await;

        assert_eq!(chunks, vec!["partial ".to_string(), CHAT_FAILURE_MESSAGE.to_string()]);
        let log = orchestrator.get_session(&session.id).await.unwrap().messages;
        assert_eq!(log[1].content, CHAT_FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn request_caps_max_tokens_and_windows_history() {
        let llm = Arc::new(StreamingLlm::replying(vec!["ok"]));
        let (orchestrator, _dir) = orchestrator_with(llm.clone()).await;
        let session = orchestrator
            .create_session("Long", "llama-3.1-8b-instant")
            .await
            .unwrap();

        for i in 0..12 {
            orchestrator
                .add_message(&session.id, ChatRole::User, &format!("turn {}", i), None)
                .await
                .unwrap();
        }

        let stream = orchestrator
            .send_message(&session.id, "turn 12", &chat_config())
            .await
            .unwrap();
        let _: Vec<String> = stream.collect().await;

        let seen = llm.seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.max_tokens, 4096);
        // System message plus the 10 most recent turns.
        assert_eq!(request.messages.len(), 11);
        assert_eq!(request.messages[0].role, ChatRole::System);
        assert_eq!(request.messages[1].content, "turn 3");
        assert_eq!(request.messages[10].content, "turn 12");
    }

    #[tokio::test]
    async fn document_digests_ride_in_the_system_message() {
        let llm = Arc::new(StreamingLlm::replying(vec!["ok"]));
        let (orchestrator, _dir) = orchestrator_with(llm.clone()).await;
        let session = orchestrator
            .create_session("Docs", "llama-3.1-8b-instant")
            .await
            .unwrap();

        orchestrator
            .add_document_to_session(
                &session.id,
                ChatAttachment {
                    id: "d1".to_string(),
                    name: "krebs.pdf".to_string(),
                    kind: AttachmentKind::Document,
                    size: 10,
                    content: Some("Citric acid cycle notes".to_string()),
                    url: None,
                },
            )
            .await
            .unwrap();

        let stream = orchestrator
            .send_message(&session.id, "Summarize my notes", &chat_config())
            .await
            .unwrap();
        let _: Vec<String> = stream.collect().await;

        let seen = llm.seen.lock().unwrap();
        let system = &seen[0].messages[0].content;
        assert!(system.contains("You are a patient tutor."));
        assert!(system.contains("krebs.pdf: Citric acid cycle notes..."));
    }
}
