//! services/engine/src/extract/ooxml.rs
//!
//! Shared helpers for reading Office Open XML containers (DOCX, PPTX).
//! Both formats are zip archives holding XML parts plus media blobs.

use crate::error::{EngineError, EngineResult};
use std::io::{Cursor, Read};
use zip::ZipArchive;

pub(crate) type Archive<'a> = ZipArchive<Cursor<&'a [u8]>>;

/// Opens a byte slice as a zip archive.
pub(crate) fn open_archive(bytes: &[u8]) -> EngineResult<Archive<'_>> {
    ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| EngineError::Internal(format!("Failed to open document archive: {}", e)))
}

/// All entry names in the archive, in archive order.
pub(crate) fn entry_names(archive: &Archive<'_>) -> Vec<String> {
    archive.file_names().map(str::to_string).collect()
}

/// Reads one named entry as a UTF-8 string.
pub(crate) fn read_entry_string(archive: &mut Archive<'_>, name: &str) -> EngineResult<String> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| EngineError::Internal(format!("Missing archive entry {}: {}", name, e)))?;
    let mut contents = String::new();
    entry
        .read_to_string(&mut contents)
        .map_err(|e| EngineError::Internal(format!("Failed to read archive entry {}: {}", name, e)))?;
    Ok(contents)
}

/// Reads one named entry as raw bytes.
pub(crate) fn read_entry_bytes(archive: &mut Archive<'_>, name: &str) -> EngineResult<Vec<u8>> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| EngineError::Internal(format!("Missing archive entry {}: {}", name, e)))?;
    let mut contents = Vec::new();
    entry
        .read_to_end(&mut contents)
        .map_err(|e| EngineError::Internal(format!("Failed to read archive entry {}: {}", name, e)))?;
    Ok(contents)
}
