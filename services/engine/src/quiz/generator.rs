//! services/engine/src/quiz/generator.rs
//!
//! Builds the quiz-generation prompt, invokes the text-generation backend,
//! and turns its raw output into validated questions via the parser.

use crate::error::{EngineError, EngineResult};
use crate::quiz::parser::parse_quiz_response;
use std::sync::Arc;
use studyhall_core::domain::{
    GenerationRequest, PromptMessage, QuestionTypeMix, QuizOptions, QuizQuestion,
};
use studyhall_core::ports::TextGenerationService;
use tracing::{info, instrument};

/// Shorter texts do not carry enough material for meaningful questions.
pub const MIN_QUIZ_TEXT_LEN: usize = 100;

/// Fixed sampling temperature for question generation.
const QUIZ_TEMPERATURE: f32 = 0.7;

/// Generous ceiling: roughly 15 questions with explanations.
const QUIZ_MAX_TOKENS: u32 = 8000;

const QUIZ_SYSTEM_PROMPT: &str = "You are an expert quiz generator. Create high-quality \
educational questions based on the provided content. CRITICAL: You must respond ONLY with \
valid JSON format. Do not include any explanatory text before or after the JSON. Start your \
response with { and end with }. Use only straight double quotes (\") for JSON strings, never \
use curly quotes or other quote variants.";

//=========================================================================================
// The Generator
//=========================================================================================

/// Generates quizzes from extracted document text.
#[derive(Clone)]
pub struct QuizGenerator {
    llm: Arc<dyn TextGenerationService>,
    model: String,
}

impl QuizGenerator {
    /// Creates a new `QuizGenerator` bound to one backend model.
    pub fn new(llm: Arc<dyn TextGenerationService>, model: String) -> Self {
        Self { llm, model }
    }

    /// Generates `options.num_questions` questions from `text`.
    ///
    /// Fails with `InsufficientContent` for texts under
    /// [`MIN_QUIZ_TEXT_LEN`] characters; backend failures are wrapped as
    /// `QuizGeneration` and parse failures as `QuizParse`.
    #[instrument(level = "info", skip(self, text), fields(model = %self.model, text_len = text.len()))]
    pub async fn generate_quiz(
        &self,
        text: &str,
        options: &QuizOptions,
    ) -> EngineResult<Vec<QuizQuestion>> {
        if text.trim().chars().count() < MIN_QUIZ_TEXT_LEN {
            return Err(EngineError::InsufficientContent);
        }

        let prompt = build_quiz_prompt(text, options);

        let request = GenerationRequest {
            model: self.model.clone(),
            messages: vec![
                PromptMessage::system(QUIZ_SYSTEM_PROMPT),
                PromptMessage::user(prompt),
            ],
            temperature: QUIZ_TEMPERATURE,
            max_tokens: QUIZ_MAX_TOKENS,
        };

        let content = self
            .llm
            .complete(request)
            .await
            .map_err(|e| EngineError::QuizGeneration(e.to_string()))?;

        let questions = parse_quiz_response(&content)?;
        info!(count = questions.len(), "quiz generated");
        Ok(questions)
    }
}

//=========================================================================================
// Prompt Construction
//=========================================================================================

fn build_quiz_prompt(text: &str, options: &QuizOptions) -> String {
    let type_instruction = match options.question_type {
        QuestionTypeMix::Mixed => "Mix of multiple choice (4 options) and true/false questions",
        QuestionTypeMix::Mcq => "Multiple choice questions with 4 options each",
        QuestionTypeMix::TrueFalse => "True/false questions only",
    };
    let difficulty = options.difficulty.as_str();
    let num_questions = options.num_questions;

    format!(
        r#"
Based on the following text, generate {num_questions} {difficulty} difficulty quiz questions.

Question Type: {type_instruction}

Text Content:
{text}

Requirements:
1. Questions should test understanding of key concepts from the text
2. For MCQ: Provide exactly 4 options with one correct answer
3. For True/False: Create statements that can be clearly true or false based on the text
4. Include explanations for each correct answer
5. Ensure questions are {difficulty} difficulty level
6. Use only standard double quotes (") in the JSON response
7. Escape any quotes within text content using \"

IMPORTANT: Respond ONLY with valid JSON. No additional text, code blocks, or explanations outside the JSON.

Response Format (JSON):
{{
  "questions": [
    {{
      "id": "q1",
      "type": "mcq",
      "question": "Question text here?",
      "options": ["Option A", "Option B", "Option C", "Option D"],
      "correctAnswer": "Option A",
      "explanation": "Explanation of why this is correct",
      "difficulty": "{difficulty}"
    }},
    {{
      "id": "q2",
      "type": "true_false",
      "question": "Statement to evaluate",
      "correctAnswer": true,
      "explanation": "Explanation of the answer",
      "difficulty": "{difficulty}"
    }}
  ]
}}

Generate exactly {num_questions} questions following this format. Return ONLY the JSON object - no code blocks, no explanatory text."#
    )
}
