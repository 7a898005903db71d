//! services/engine/src/extract/pdf.rs
//!
//! PDF extraction. PDFs are deliberately treated as image-like input and sent
//! whole to the vision backend: the page count is always reported as 1 and the
//! file is always flagged image-based, even for text-native PDFs. Keeping one
//! uniform OCR path avoids a text-layer/scanned-page split in the caller.

use crate::error::{EngineError, EngineResult};
use studyhall_core::ports::VisionOcrService;

pub struct PdfExtraction {
    pub text: String,
    pub page_count: usize,
    pub is_image_based: bool,
}

/// Extracts a PDF's text by OCR'ing the whole file.
pub async fn extract(
    bytes: &[u8],
    ocr: Option<&dyn VisionOcrService>,
) -> EngineResult<PdfExtraction> {
    let ocr = ocr.ok_or(EngineError::OcrUnavailable("PDF"))?;

    let text = ocr.extract_text(bytes).await?;

    Ok(PdfExtraction {
        text,
        // The backend consumes the document as one unit.
        page_count: 1,
        is_image_based: true,
    })
}
