//! services/engine/src/extract/docx.rs
//!
//! Word-processor extraction: paragraph text runs from `word/document.xml`.
//! Embedded images are deliberately not OCR'd; only the text layer is read.

use super::ooxml;
use crate::error::EngineResult;
use quick_xml::events::Event;
use quick_xml::Reader;

pub struct DocxExtraction {
    pub text: String,
    pub word_count: usize,
}

/// Extracts the paragraph text of a DOCX file.
pub fn extract(bytes: &[u8]) -> EngineResult<DocxExtraction> {
    let mut archive = ooxml::open_archive(bytes)?;
    let document_xml = ooxml::read_entry_string(&mut archive, "word/document.xml")?;

    let text = document_text(&document_xml);
    let word_count = text.split_whitespace().count();

    Ok(DocxExtraction { text, word_count })
}

/// Collects `<w:t>` runs, emitting one line per closed `<w:p>` paragraph.
fn document_text(xml: &str) -> String {
    let mut reader = Reader::from_str(xml);
    let mut in_run = false;
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_run = true,
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_run = false,
                b"w:p" => {
                    let paragraph = current.trim().to_string();
                    if !paragraph.is_empty() {
                        paragraphs.push(paragraph);
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Text(t)) if in_run => {
                if let Ok(run) = t.unescape() {
                    current.push_str(&run);
                }
            }
            Ok(Event::Eof) => break,
            // A malformed part yields whatever was readable up to the error.
            Err(_) => break,
            _ => {}
        }
    }

    if !current.trim().is_empty() {
        paragraphs.push(current.trim().to_string());
    }

    paragraphs.join("\n")
}
