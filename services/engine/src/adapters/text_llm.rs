//! services/engine/src/adapters/text_llm.rs
//!
//! This module contains the adapter for the text-generation LLM backend.
//! It implements the `TextGenerationService` port from the `core` crate using
//! any OpenAI-compatible chat-completions endpoint (Groq in production).

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;
use studyhall_core::domain::{ChatRole, GenerationRequest, PromptMessage};
use studyhall_core::ports::{PortError, PortResult, TextDeltaStream, TextGenerationService};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `TextGenerationService` using an
/// OpenAI-compatible chat-completions API.
#[derive(Clone)]
pub struct OpenAiTextAdapter {
    client: Client<OpenAIConfig>,
    /// Model used for connectivity probes only; real calls carry their own.
    probe_model: String,
}

impl OpenAiTextAdapter {
    /// Creates a new `OpenAiTextAdapter`.
    pub fn new(client: Client<OpenAIConfig>, probe_model: String) -> Self {
        Self {
            client,
            probe_model,
        }
    }

    fn to_backend_messages(
        messages: &[PromptMessage],
    ) -> PortResult<Vec<ChatCompletionRequestMessage>> {
        messages
            .iter()
            .map(|msg| {
                let converted = match msg.role {
                    ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
                        .content(msg.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::System),
                    ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
                        .content(msg.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::User),
                    ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                        .content(msg.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::Assistant),
                };
                converted.map_err(|e| PortError::Unexpected(e.to_string()))
            })
            .collect()
    }
}

//=========================================================================================
// `TextGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextGenerationService for OpenAiTextAdapter {
    /// Runs one non-streaming completion and returns the full response text.
    async fn complete(&self, request: GenerationRequest) -> PortResult<String> {
        let backend_request = CreateChatCompletionRequestArgs::default()
            .model(&request.model)
            .messages(Self::to_backend_messages(&request.messages)?)
            .temperature(request.temperature)
            .max_tokens(request.max_tokens)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(backend_request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Unexpected("LLM response contained no text content.".to_string())
            })
    }

    /// Runs one streaming completion, yielding text deltas in arrival order.
    async fn complete_streaming(
        &self,
        request: GenerationRequest,
    ) -> PortResult<TextDeltaStream> {
        let backend_request = CreateChatCompletionRequestArgs::default()
            .model(&request.model)
            .messages(Self::to_backend_messages(&request.messages)?)
            .temperature(request.temperature)
            .max_tokens(request.max_tokens)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let stream = self
            .client
            .chat()
            .create_stream(backend_request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        // Empty deltas (role-only chunks, keep-alives) are filtered out so
        // consumers only ever see real text.
        let deltas = stream.filter_map(|item| async move {
            match item {
                Ok(chunk) => chunk
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta.content)
                    .filter(|content| !content.is_empty())
                    .map(Ok),
                Err(e) => Some(Err(PortError::Unexpected(e.to_string()))),
            }
        });

        Ok(Box::pin(deltas))
    }

    /// Sends a tiny completion to verify the backend is reachable.
    async fn probe(&self) -> PortResult<bool> {
        let backend_request = CreateChatCompletionRequestArgs::default()
            .model(&self.probe_model)
            .messages(vec![ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content("Test connection - respond with \"OK\"")
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?,
            )])
            .max_tokens(5u32)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(backend_request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        Ok(!response.choices.is_empty())
    }
}
