//! services/engine/src/extract/image.rs
//!
//! Raster-image extraction: the whole file goes to the vision backend.

use crate::error::{EngineError, EngineResult};
use studyhall_core::ports::VisionOcrService;

pub async fn extract(bytes: &[u8], ocr: Option<&dyn VisionOcrService>) -> EngineResult<String> {
    let ocr = ocr.ok_or(EngineError::OcrUnavailable("image"))?;
    Ok(ocr.extract_text(bytes).await?)
}
