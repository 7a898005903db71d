//! services/engine/src/chat/context.rs
//!
//! Assembles a bounded-size prompt from a session's system prompt, attached
//! document excerpts, and recent message history. Token counts are estimated
//! at roughly 4 characters per token; no real tokenizer is involved, so the
//! budget is a guardrail rather than an exact accounting.

use studyhall_core::domain::{AttachmentKind, ChatConfig, ChatMessage, ChatRole, ChatSession};

/// Context window sizes per supported model. Unknown models fall back to the
/// smallest window so the budget errs on the safe side.
const MODEL_CONTEXT_LIMITS: [(&str, usize); 8] = [
    ("llama-3.1-70b-versatile", 131_072),
    ("llama-3.1-8b-instant", 131_072),
    ("llama-3.2-11b-text-preview", 8_192),
    ("llama-3.2-3b-preview", 8_192),
    ("llama-3.2-1b-preview", 8_192),
    ("mixtral-8x7b-32768", 32_768),
    ("gemma-7b-it", 8_192),
    ("gemma2-9b-it", 8_192),
];

const DEFAULT_CONTEXT_LIMIT: usize = 8_192;

/// Document excerpts injected into context are capped at this many characters.
const DOCUMENT_EXCERPT_LEN: usize = 2_000;

const DOCUMENT_USAGE_INSTRUCTIONS: &str = "INSTRUCTIONS FOR USING STUDY MATERIALS:\n\
- Reference specific information from these documents when answering questions\n\
- Help the student make connections between different concepts in the materials\n\
- Identify key topics and themes across the documents\n\
- Suggest study strategies based on the content type and complexity\n\
- Point out important definitions, formulas, or concepts for exam preparation\n\n";

/// One entry of the supported-model listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: String,
    pub context_limit: usize,
}

/// Approximate token count: 1 token per 4 characters, rounded up.
pub fn estimate_token_count(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// The full context window of `model`.
pub fn model_context_limit(model: &str) -> usize {
    MODEL_CONTEXT_LIMITS
        .iter()
        .find(|(id, _)| *id == model)
        .map(|(_, limit)| *limit)
        .unwrap_or(DEFAULT_CONTEXT_LIMIT)
}

/// The effective token budget: the configured percentage of the model window.
pub fn context_budget(model: &str, limit_percent: u32) -> usize {
    model_context_limit(model) * limit_percent as usize / 100
}

pub fn is_valid_model(model: &str) -> bool {
    MODEL_CONTEXT_LIMITS.iter().any(|(id, _)| *id == model)
}

/// All supported models with display names for a picker UI.
pub fn available_models() -> Vec<ModelInfo> {
    MODEL_CONTEXT_LIMITS
        .iter()
        .map(|(id, limit)| ModelInfo {
            id,
            name: display_name(id),
            context_limit: *limit,
        })
        .collect()
}

fn display_name(id: &str) -> String {
    id.split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Builds the prompt text for one session under the configured budget.
///
/// Order: system prompt, then (when enabled) one structured block per
/// attached document plus usage instructions, then as many of the most
/// recent messages as fit, re-ordered back to chronological order.
pub fn build_session_context(session: &ChatSession, config: &ChatConfig) -> String {
    let mut context = format!("{}\n\n", config.system_prompt);

    if config.enable_document_context && !session.documents.is_empty() {
        context.push_str("STUDENT STUDY MATERIALS:\n");
        context.push_str(
            "You have access to the following documents that the student has uploaded for learning support:\n\n",
        );

        for (index, document) in session.documents.iter().enumerate() {
            let Some(content) = &document.content else {
                continue;
            };
            let excerpt: String = content.chars().take(DOCUMENT_EXCERPT_LEN).collect();
            let ellipsis = if content.chars().count() > DOCUMENT_EXCERPT_LEN {
                "..."
            } else {
                ""
            };

            context.push_str(&format!("Document {}: \"{}\"\n", index + 1, document.name));
            context.push_str(&format!("Type: {}\n", kind_label(document.kind)));
            context.push_str(&format!("Content Summary: {}{}\n", excerpt, ellipsis));
            context.push_str("---\n\n");
        }

        context.push_str(DOCUMENT_USAGE_INSTRUCTIONS);
    }

    let budget = context_budget(&config.selected_model, config.context_limit_percent);
    let mut used_tokens = estimate_token_count(&context);

    // Walk newest to oldest, stop at the first message that would overflow,
    // then restore chronological order for rendering.
    let mut included: Vec<&ChatMessage> = Vec::new();
    for message in session.messages.iter().rev() {
        let message_tokens = estimate_token_count(&message.content);
        if used_tokens + message_tokens > budget {
            break;
        }
        included.push(message);
        used_tokens += message_tokens;
    }
    included.reverse();

    if !included.is_empty() {
        context.push_str("CONVERSATION HISTORY:\n");
        for message in included {
            let speaker = match message.role {
                ChatRole::User => "Student",
                _ => "Tutor",
            };
            context.push_str(&format!("{}: {}\n", speaker, message.content));
        }
        context.push('\n');
    }

    context
}

fn kind_label(kind: AttachmentKind) -> &'static str {
    match kind {
        AttachmentKind::Document => "document",
        AttachmentKind::Image => "image",
    }
}
