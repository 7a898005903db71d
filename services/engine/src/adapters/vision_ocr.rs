//! services/engine/src/adapters/vision_ocr.rs
//!
//! This module contains the adapter for the vision/OCR backend.
//! It implements the `VisionOcrService` port from the `core` crate by sending
//! base64-encoded image bytes to an OpenAI-compatible vision model
//! (Mistral's pixtral in production).

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs,
        ImageUrlArgs,
    },
    Client,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use studyhall_core::ports::{PortError, PortResult, VisionOcrService};

const OCR_INSTRUCTION: &str = "Extract all text from this image. Return only the text content, \
maintaining the original structure and formatting as much as possible.";

/// A 1x1 transparent PNG used for connectivity probes.
const PROBE_IMAGE_B64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `VisionOcrService` port using an
/// OpenAI-compatible vision model.
#[derive(Clone)]
pub struct OpenAiVisionAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiVisionAdapter {
    /// Creates a new `OpenAiVisionAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    fn image_message(
        instruction: &str,
        data_url: String,
    ) -> PortResult<ChatCompletionRequestMessage> {
        let parts: Vec<ChatCompletionRequestUserMessageContentPart> = vec![
            ChatCompletionRequestMessageContentPartTextArgs::default()
                .text(instruction)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestMessageContentPartImageArgs::default()
                .image_url(
                    ImageUrlArgs::default()
                        .url(data_url)
                        .build()
                        .map_err(|e| PortError::Unexpected(e.to_string()))?,
                )
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        Ok(ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(parts)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?,
        ))
    }
}

//=========================================================================================
// `VisionOcrService` Trait Implementation
//=========================================================================================

#[async_trait]
impl VisionOcrService for OpenAiVisionAdapter {
    /// Extracts text from image bytes via the vision model.
    ///
    /// The bytes are shipped whole as a base64 data URL; the backend decides
    /// what it can read out of them.
    async fn extract_text(&self, image_bytes: &[u8]) -> PortResult<String> {
        let data_url = format!("data:image/jpeg;base64,{}", BASE64.encode(image_bytes));

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![Self::image_message(OCR_INSTRUCTION, data_url)?])
            .max_tokens(16000u32)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }

    /// Sends a 1x1 test image to verify the backend is reachable.
    async fn probe(&self) -> PortResult<bool> {
        let data_url = format!("data:image/png;base64,{}", PROBE_IMAGE_B64);

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![Self::image_message("Test connection", data_url)?])
            .max_tokens(10u32)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        Ok(!response.choices.is_empty())
    }
}
