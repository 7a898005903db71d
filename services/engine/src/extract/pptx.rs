//! services/engine/src/extract/pptx.rs
//!
//! Presentation extraction: per-slide text runs from `ppt/slides/slideN.xml`
//! parts, plus OCR of a bounded number of embedded raster images.

use super::ooxml;
use crate::error::EngineResult;
use quick_xml::events::Event;
use quick_xml::Reader;
use studyhall_core::ports::VisionOcrService;
use tracing::warn;

/// Embedded images OCR'd per presentation. Decks routinely carry dozens of
/// decorative images; five keeps backend cost bounded.
const MAX_OCR_IMAGES: usize = 5;

const SLIDE_PREFIX: &str = "ppt/slides/slide";
const MEDIA_PREFIX: &str = "ppt/media/";

pub struct PptxExtraction {
    pub text: String,
    pub slide_count: usize,
}

/// Extracts slide text and (when an OCR backend is available) the text of up
/// to [`MAX_OCR_IMAGES`] embedded images, each section labeled by its source.
pub async fn extract(
    bytes: &[u8],
    ocr: Option<&dyn VisionOcrService>,
) -> EngineResult<PptxExtraction> {
    let mut archive = ooxml::open_archive(bytes)?;
    let names = ooxml::entry_names(&archive);

    // Slide parts are numbered slide1.xml, slide2.xml, ... slide10.xml; the
    // archive does not guarantee numeric order, so sort by the parsed index.
    let mut slide_parts: Vec<(usize, String)> = names
        .iter()
        .filter(|name| name.starts_with(SLIDE_PREFIX) && name.ends_with(".xml"))
        .map(|name| (slide_number(name).unwrap_or(usize::MAX), name.clone()))
        .collect();
    slide_parts.sort();

    let slide_count = slide_parts.len();
    let mut sections: Vec<String> = Vec::new();

    for (position, (number, name)) in slide_parts.into_iter().enumerate() {
        let slide_xml = ooxml::read_entry_string(&mut archive, &name)?;
        let slide_text = slide_text(&slide_xml);
        if !slide_text.is_empty() {
            let label = if number == usize::MAX { position + 1 } else { number };
            sections.push(format!("--- Slide {} ---\n{}", label, slide_text));
        }
    }

    if let Some(ocr) = ocr {
        let image_names: Vec<String> = names
            .iter()
            .filter(|name| name.starts_with(MEDIA_PREFIX) && is_raster_image(name))
            .take(MAX_OCR_IMAGES)
            .cloned()
            .collect();

        for name in image_names {
            let image_bytes = ooxml::read_entry_bytes(&mut archive, &name)?;
            match ocr.extract_text(&image_bytes).await {
                Ok(text) if !text.trim().is_empty() => {
                    sections.push(format!("--- Image: {} ---\n{}", name, text));
                }
                Ok(_) => {}
                Err(e) => {
                    // One unreadable image never sinks the whole deck.
                    warn!(image = %name, error = %e, "embedded image OCR failed");
                }
            }
        }
    }

    Ok(PptxExtraction {
        text: sections.join("\n\n"),
        slide_count,
    })
}

fn slide_number(name: &str) -> Option<usize> {
    name.strip_prefix(SLIDE_PREFIX)?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}

fn is_raster_image(name: &str) -> bool {
    let lowered = name.to_lowercase();
    [".jpg", ".jpeg", ".png", ".gif"]
        .iter()
        .any(|ext| lowered.ends_with(ext))
}

/// Collects `<a:t>` runs from one slide, joined by single spaces.
fn slide_text(xml: &str) -> String {
    let mut reader = Reader::from_str(xml);
    let mut in_run = false;
    let mut runs: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"a:t" => in_run = true,
            Ok(Event::End(e)) if e.name().as_ref() == b"a:t" => in_run = false,
            Ok(Event::Text(t)) if in_run => {
                if let Ok(run) = t.unescape() {
                    let run = run.trim().to_string();
                    if !run.is_empty() {
                        runs.push(run);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }

    runs.join(" ")
}
