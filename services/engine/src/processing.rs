//! services/engine/src/processing.rs
//!
//! The document processing orchestrator: validates incoming files, dispatches
//! to the right extractor, optionally generates a quiz from the extracted
//! text, and aggregates per-file metadata. `process_document` never fails
//! outright; every failure is captured into the returned result.

use crate::error::{EngineError, EngineResult};
use crate::extract::{docx, image, pdf, pptx, text};
use crate::quiz::QuizGenerator;
use std::sync::Arc;
use std::time::Instant;
use studyhall_core::domain::{
    BatchProcessingResult, DocumentMetadata, FileInput, ProcessingOptions, ProcessingResult,
    QuizOptions, QuizQuestion,
};
use studyhall_core::ports::{TextGenerationService, VisionOcrService};
use tracing::{info, instrument, warn};

pub const SUPPORTED_FILE_TYPES: [&str; 10] = [
    "pdf", "docx", "pptx", "txt", "jpg", "jpeg", "png", "gif", "bmp", "webp",
];

pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

/// Quiz generation reads at most this many characters of extracted text.
const QUIZ_TEXT_LIMIT: usize = 20_000;

const QUIZ_TRUNCATION_MARKER: &str = "\n\n[Content truncated for quiz generation]";

const DOCUMENT_SEPARATOR: &str = "\n\n--- Document Separator ---\n\n";

/// Result of [`DocumentProcessor::probe_backends`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendProbe {
    pub text_generation: bool,
    pub ocr: bool,
}

//=========================================================================================
// The Orchestrator
//=========================================================================================

/// Coordinates extraction and quiz generation for uploaded study documents.
///
/// Both backends are optional: without OCR the pdf/image paths fail with an
/// explicit error, without a text backend quiz generation does.
pub struct DocumentProcessor {
    ocr: Option<Arc<dyn VisionOcrService>>,
    llm: Option<Arc<dyn TextGenerationService>>,
    quiz_generator: Option<QuizGenerator>,
}

impl DocumentProcessor {
    pub fn new(
        ocr: Option<Arc<dyn VisionOcrService>>,
        llm: Option<Arc<dyn TextGenerationService>>,
        quiz_model: String,
    ) -> Self {
        let quiz_generator = llm
            .clone()
            .map(|backend| QuizGenerator::new(backend, quiz_model));
        Self {
            ocr,
            llm,
            quiz_generator,
        }
    }

    pub fn is_file_type_supported(file_name: &str) -> bool {
        match file_name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => {
                SUPPORTED_FILE_TYPES.contains(&ext.to_lowercase().as_str())
            }
            _ => false,
        }
    }

    /// Checks type and size before any extraction work happens.
    pub fn validate_file(file: &FileInput) -> Result<(), String> {
        if !Self::is_file_type_supported(&file.name) {
            return Err(format!(
                "Unsupported file type. Supported types: {}",
                SUPPORTED_FILE_TYPES.join(", ")
            ));
        }

        if file.size() > MAX_FILE_SIZE {
            return Err(format!(
                "File too large. Maximum size: {}MB",
                MAX_FILE_SIZE / (1024 * 1024)
            ));
        }

        Ok(())
    }

    /// Extracts text from one file and, when requested, generates a quiz.
    ///
    /// Never returns an error: validation and extraction failures land in
    /// `error`, quiz failures in `quiz_error` without flipping `success`.
    #[instrument(level = "info", skip(self, file, options), fields(file_name = %file.name, file_size = file.size()))]
    pub async fn process_document(
        &self,
        file: &FileInput,
        options: &ProcessingOptions,
    ) -> ProcessingResult {
        let started = Instant::now();

        let mut result = ProcessingResult {
            success: false,
            text: String::new(),
            word_count: 0,
            processing_time_ms: 0,
            file_type: file.file_type(),
            file_name: file.name.clone(),
            file_size: file.size(),
            quiz: None,
            error: None,
            quiz_error: None,
            metadata: DocumentMetadata::default(),
        };

        if let Err(message) = Self::validate_file(file) {
            warn!(%message, "file rejected before extraction");
            result.error = Some(message);
            result.processing_time_ms = started.elapsed().as_millis() as u64;
            return result;
        }

        if let Err(e) = self.extract_into(file, &mut result).await {
            result.success = false;
            result.error = Some(e.to_string());
        }

        if result.word_count == 0 {
            result.word_count = count_words(&result.text);
        }

        if options.generate_quiz && result.success && !result.text.trim().is_empty() {
            let text_for_quiz = truncate_for_quiz(&result.text);
            match self
                .generate_quiz_from_text(&text_for_quiz, &options.quiz_options)
                .await
            {
                Ok(quiz) => {
                    info!(questions = quiz.len(), "quiz attached to processing result");
                    result.quiz = Some(quiz);
                }
                Err(e) => {
                    warn!(error = %e, "quiz generation failed");
                    result.quiz_error = Some(e.to_string());
                }
            }
        }

        result.processing_time_ms = started.elapsed().as_millis() as u64;
        result
    }

    async fn extract_into(
        &self,
        file: &FileInput,
        result: &mut ProcessingResult,
    ) -> EngineResult<()> {
        let ocr = self.ocr.as_deref();

        match result.file_type.as_str() {
            "txt" => {
                result.text = text::extract(&file.bytes);
                result.success = true;
            }
            "pdf" => {
                let extraction = pdf::extract(&file.bytes, ocr).await?;
                result.text = extraction.text;
                result.success = true;
                result.metadata = DocumentMetadata {
                    page_count: Some(extraction.page_count),
                    slide_count: None,
                    is_image_based: extraction.is_image_based,
                    ocr_used: extraction.is_image_based,
                };
            }
            "docx" => {
                let extraction = docx::extract(&file.bytes)?;
                result.text = extraction.text;
                result.word_count = extraction.word_count;
                result.success = true;
            }
            "pptx" => {
                let extraction = pptx::extract(&file.bytes, ocr).await?;
                result.text = extraction.text;
                result.success = true;
                result.metadata = DocumentMetadata {
                    page_count: None,
                    slide_count: Some(extraction.slide_count),
                    is_image_based: false,
                    // Presentation processing includes embedded-image OCR.
                    ocr_used: true,
                };
            }
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" => {
                result.text = image::extract(&file.bytes, ocr).await?;
                result.success = true;
                result.metadata.ocr_used = true;
            }
            // Unreachable after validation, kept defensive.
            other => return Err(EngineError::UnsupportedFileType(other.to_string())),
        }

        Ok(())
    }

    /// Generates a quiz directly from already-extracted text.
    pub async fn generate_quiz_from_text(
        &self,
        text: &str,
        options: &QuizOptions,
    ) -> EngineResult<Vec<QuizQuestion>> {
        let generator = self.quiz_generator.as_ref().ok_or_else(|| {
            EngineError::QuizGeneration(
                "Text generation API key required for quiz generation".to_string(),
            )
        })?;

        generator.generate_quiz(text, options).await
    }

    /// Generates one quiz spanning several processed documents.
    pub async fn generate_quiz_from_documents(
        &self,
        results: &[ProcessingResult],
        options: &QuizOptions,
    ) -> EngineResult<Vec<QuizQuestion>> {
        let combined = results
            .iter()
            .filter(|r| r.success && !r.text.trim().is_empty())
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join(DOCUMENT_SEPARATOR);

        self.generate_quiz_from_text(&combined, options).await
    }

    /// Processes files strictly sequentially, reporting progress before each
    /// file and once more when the batch is done.
    pub async fn process_batch(
        &self,
        files: &[FileInput],
        options: &ProcessingOptions,
        mut on_progress: impl FnMut(usize, usize, &str),
    ) -> BatchProcessingResult {
        let started = Instant::now();
        let mut results = Vec::with_capacity(files.len());

        for (index, file) in files.iter().enumerate() {
            on_progress(index, files.len(), &file.name);
            results.push(self.process_document(file, options).await);
        }

        on_progress(files.len(), files.len(), "");

        let successful_files = results.iter().filter(|r| r.success).count();
        BatchProcessingResult {
            total_files: files.len(),
            successful_files,
            failed_files: results.len() - successful_files,
            total_processing_time_ms: started.elapsed().as_millis() as u64,
            results,
        }
    }

    /// Checks which backends are reachable. Missing backends report `false`;
    /// this never fails.
    pub async fn probe_backends(&self) -> BackendProbe {
        let text_generation = match &self.llm {
            Some(llm) => llm.probe().await.unwrap_or(false),
            None => false,
        };
        let ocr = match &self.ocr {
            Some(ocr) => ocr.probe().await.unwrap_or(false),
            None => false,
        };

        BackendProbe {
            text_generation,
            ocr,
        }
    }
}

fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

fn truncate_for_quiz(text: &str) -> String {
    if text.chars().count() <= QUIZ_TEXT_LIMIT {
        return text.to_string();
    }
    let truncated: String = text.chars().take(QUIZ_TEXT_LIMIT).collect();
    format!("{}{}", truncated, QUIZ_TRUNCATION_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use studyhall_core::domain::GenerationRequest;
    use studyhall_core::ports::{PortError, PortResult, TextDeltaStream};

    struct CountingOcr {
        calls: AtomicUsize,
        response: &'static str,
    }

    impl CountingOcr {
        fn new(response: &'static str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                response,
            }
        }
    }

    #[async_trait]
    impl VisionOcrService for CountingOcr {
        async fn extract_text(&self, _image_bytes: &[u8]) -> PortResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.to_string())
        }
        async fn probe(&self) -> PortResult<bool> {
            Ok(true)
        }
    }

    struct ScriptedLlm {
        response: Result<&'static str, &'static str>,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedLlm {
        fn replying(response: &'static str) -> Self {
            Self {
                response: Ok(response),
                seen: Mutex::new(Vec::new()),
            }
        }
        fn failing(message: &'static str) -> Self {
            Self {
                response: Err(message),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TextGenerationService for ScriptedLlm {
        async fn complete(&self, request: GenerationRequest) -> PortResult<String> {
            self.seen.lock().unwrap().push(request);
            self.response
                .map(str::to_string)
                .map_err(|e| PortError::Unexpected(e.to_string()))
        }
        async fn complete_streaming(
            &self,
            _request: GenerationRequest,
        ) -> PortResult<TextDeltaStream> {
            unimplemented!("document processing never streams")
        }
        async fn probe(&self) -> PortResult<bool> {
            Ok(self.response.is_ok())
        }
    }

    const QUIZ_JSON: &str = r#"{"questions": [
        {"id": "q1", "type": "true_false", "question": "Water is wet.",
         "correctAnswer": true, "explanation": "By definition.", "difficulty": "easy"}
    ]}"#;

    fn processor_with(
        ocr: Option<Arc<CountingOcr>>,
        llm: Option<Arc<ScriptedLlm>>,
    ) -> DocumentProcessor {
        DocumentProcessor::new(
            ocr.map(|o| o as Arc<dyn VisionOcrService>),
            llm.map(|l| l as Arc<dyn TextGenerationService>),
            "quiz-model".to_string(),
        )
    }

    fn study_text(len: usize) -> String {
        "The water cycle moves water between oceans, atmosphere, and land. "
            .chars()
            .cycle()
            .take(len)
            .collect()
    }

    #[tokio::test]
    async fn unsupported_extension_fails_without_touching_backends() {
        let ocr = Arc::new(CountingOcr::new("unused"));
        let llm = Arc::new(ScriptedLlm::replying(QUIZ_JSON));
        let processor = processor_with(Some(ocr.clone()), Some(llm.clone()));

        let file = FileInput::new("malware.exe", b"MZ".to_vec());
        let options = ProcessingOptions {
            generate_quiz: true,
            quiz_options: QuizOptions::default(),
        };
        let result = processor.process_document(&file, &options).await;

        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.contains("Unsupported file type"));
        assert!(error.contains("pdf, docx, pptx, txt, jpg, jpeg, png, gif, bmp, webp"));
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
        assert!(llm.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_file_fails_before_extraction() {
        let ocr = Arc::new(CountingOcr::new("unused"));
        let processor = processor_with(Some(ocr.clone()), None);

        let file = FileInput::new("huge.png", vec![0u8; MAX_FILE_SIZE + 1]);
        let result = processor
            .process_document(&file, &ProcessingOptions::default())
            .await;

        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("File too large. Maximum size: 50MB")
        );
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn txt_extraction_counts_words() {
        let processor = processor_with(None, None);
        let file = FileInput::new("notes.txt", "alpha beta  gamma\ndelta".as_bytes().to_vec());

        let result = processor
            .process_document(&file, &ProcessingOptions::default())
            .await;

        assert!(result.success);
        assert_eq!(result.text, "alpha beta  gamma\ndelta");
        assert_eq!(result.word_count, 4);
        assert_eq!(result.file_type, "txt");
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn pdf_without_ocr_backend_reports_explicit_error() {
        let processor = processor_with(None, None);
        let file = FileInput::new("scan.pdf", b"%PDF-1.4".to_vec());

        let result = processor
            .process_document(&file, &ProcessingOptions::default())
            .await;

        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("OCR service not available for PDF processing")
        );
    }

    #[tokio::test]
    async fn pdf_is_always_single_page_and_image_based() {
        let ocr = Arc::new(CountingOcr::new("Recovered page text"));
        let processor = processor_with(Some(ocr), None);
        let file = FileInput::new("paper.pdf", b"%PDF-1.7 ...".to_vec());

        let result = processor
            .process_document(&file, &ProcessingOptions::default())
            .await;

        assert!(result.success);
        assert_eq!(result.text, "Recovered page text");
        assert_eq!(result.metadata.page_count, Some(1));
        assert!(result.metadata.is_image_based);
        assert!(result.metadata.ocr_used);
    }

    #[tokio::test]
    async fn image_extraction_marks_ocr_used() {
        let ocr = Arc::new(CountingOcr::new("Whiteboard notes"));
        let processor = processor_with(Some(ocr.clone()), None);
        let file = FileInput::new("board.jpeg", vec![0xFF, 0xD8, 0xFF]);

        let result = processor
            .process_document(&file, &ProcessingOptions::default())
            .await;

        assert!(result.success);
        assert_eq!(result.text, "Whiteboard notes");
        assert!(result.metadata.ocr_used);
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn quiz_failure_does_not_flip_extraction_success() {
        let llm = Arc::new(ScriptedLlm::failing("rate limited"));
        let processor = processor_with(None, Some(llm));
        let file = FileInput::new("notes.txt", study_text(500).into_bytes());

        let options = ProcessingOptions {
            generate_quiz: true,
            quiz_options: QuizOptions::default(),
        };
        let result = processor.process_document(&file, &options).await;

        assert!(result.success);
        assert!(result.quiz.is_none());
        let quiz_error = result.quiz_error.unwrap();
        assert!(quiz_error.starts_with("Failed to generate quiz:"));
        assert!(quiz_error.contains("rate limited"));
    }

    #[tokio::test]
    async fn quiz_without_text_backend_reports_missing_configuration() {
        let processor = processor_with(None, None);
        let file = FileInput::new("notes.txt", study_text(500).into_bytes());

        let options = ProcessingOptions {
            generate_quiz: true,
            quiz_options: QuizOptions::default(),
        };
        let result = processor.process_document(&file, &options).await;

        assert!(result.success);
        assert!(result
            .quiz_error
            .unwrap()
            .contains("API key required for quiz generation"));
    }

    #[tokio::test]
    async fn successful_quiz_rides_on_the_result() {
        let llm = Arc::new(ScriptedLlm::replying(QUIZ_JSON));
        let processor = processor_with(None, Some(llm));
        let file = FileInput::new("notes.txt", study_text(500).into_bytes());

        let options = ProcessingOptions {
            generate_quiz: true,
            quiz_options: QuizOptions::default(),
        };
        let result = processor.process_document(&file, &options).await;

        assert!(result.success);
        assert_eq!(result.quiz.unwrap().len(), 1);
        assert!(result.quiz_error.is_none());
    }

    #[tokio::test]
    async fn long_documents_are_truncated_before_quiz_generation() {
        let llm = Arc::new(ScriptedLlm::replying(QUIZ_JSON));
        let processor = processor_with(None, Some(llm.clone()));
        let file = FileInput::new("book.txt", study_text(25_000).into_bytes());

        let options = ProcessingOptions {
            generate_quiz: true,
            quiz_options: QuizOptions::default(),
        };
        let result = processor.process_document(&file, &options).await;
        assert!(result.success);

        let seen = llm.seen.lock().unwrap();
        let prompt = &seen[0].messages[1].content;
        assert!(prompt.contains("[Content truncated for quiz generation]"));
        // The full 25k characters never reach the backend.
        assert!(prompt.len() < 22_000);
    }

    #[tokio::test]
    async fn batch_reports_progress_n_plus_one_times() {
        let processor = processor_with(None, None);
        let files = vec![
            FileInput::new("a.txt", b"alpha".to_vec()),
            FileInput::new("b.exe", b"nope".to_vec()),
            FileInput::new("c.txt", b"gamma".to_vec()),
        ];

        let mut calls: Vec<(usize, usize, String)> = Vec::new();
        let batch = processor
            .process_batch(&files, &ProcessingOptions::default(), |done, total, name| {
                calls.push((done, total, name.to_string()));
            })
            .await;

        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0], (0, 3, "a.txt".to_string()));
        assert_eq!(calls[1], (1, 3, "b.exe".to_string()));
        assert_eq!(calls[2], (2, 3, "c.txt".to_string()));
        assert_eq!(calls[3], (3, 3, String::new()));

        assert_eq!(batch.total_files, 3);
        assert_eq!(batch.successful_files, 2);
        assert_eq!(batch.failed_files, 1);
        assert_eq!(batch.results.len(), 3);
    }

    #[tokio::test]
    async fn combined_document_quiz_uses_the_separator() {
        let llm = Arc::new(ScriptedLlm::replying(QUIZ_JSON));
        let processor = processor_with(None, Some(llm.clone()));

        let files = vec![
            FileInput::new("a.txt", study_text(200).into_bytes()),
            FileInput::new("b.txt", study_text(200).into_bytes()),
        ];
        let batch = processor
            .process_batch(&files, &ProcessingOptions::default(), |_, _, _| {})
            .await;

        processor
            .generate_quiz_from_documents(&batch.results, &QuizOptions::default())
            .await
            .unwrap();

        let seen = llm.seen.lock().unwrap();
        let prompt = &seen[0].messages[1].content;
        assert!(prompt.contains("--- Document Separator ---"));
    }

    #[tokio::test]
    async fn probe_reports_missing_backends_as_false() {
        let processor = processor_with(None, Some(Arc::new(ScriptedLlm::replying("OK"))));
        let probe = processor.probe_backends().await;
        assert!(probe.text_generation);
        assert!(!probe.ocr);
    }
}
