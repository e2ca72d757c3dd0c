//! Plain-text extraction for uploaded documents.
//!
//! PDFs go through `pdf-extract`; Markdown and plain text are read as UTF-8
//! (lossy). Extraction never panics: failures come back as
//! [`ExtractError`] and the index build skips the document.

use std::path::Path;

use thiserror::Error;

/// File extensions accepted for upload, lowercase.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "md", "txt"];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Lowercased extension of `path`, if any.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn is_supported(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Read a document from disk and return its text.
pub fn load_text(path: &Path) -> Result<String, ExtractError> {
    let ext = extension_of(path).unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ExtractError::UnsupportedType(path.display().to_string()));
    }
    let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.display().to_string(),
        source,
    })?;
    extract_text(&bytes, &ext)
}

/// Extract text from in-memory content of the given extension.
pub fn extract_text(bytes: &[u8], ext: &str) -> Result<String, ExtractError> {
    match ext {
        "pdf" => pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string())),
        "md" | "txt" => Ok(String::from_utf8_lossy(bytes).into_owned()),
        other => Err(ExtractError::UnsupportedType(other.to_string())),
    }
}
