//! Plain text from uploaded reference documents.
//!
//! The text feeds the planner's context. Readers return an error for a
//! file they cannot parse; the upload endpoint reports that as a file
//! with no extractable text.

pub mod doc;
pub mod docx;
pub mod pdf;

use thiserror::Error;

/// Uploaded context is capped; the tail is kept.
pub const MAX_EXTRACT_CHARS: usize = 32_000;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("Invalid DOCX archive: {0}")]
    Archive(String),

    #[error("XML parsing failed: {0}")]
    Xml(String),

    #[error("Unreadable PDF: {0}")]
    Pdf(String),

    #[error("Unreadable Word document: {0}")]
    Doc(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Upload formats, decided by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    PlainText,
    Docx,
    Doc,
    Pdf,
}

impl DocumentKind {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "txt" | "md" => Some(Self::PlainText),
            "docx" => Some(Self::Docx),
            "doc" => Some(Self::Doc),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

/// Extract text from an uploaded file, keeping the last
/// [`MAX_EXTRACT_CHARS`] characters.
pub fn extract_text(filename: &str, bytes: &[u8]) -> Result<String, ExtractError> {
    let kind = DocumentKind::from_filename(filename)
        .ok_or_else(|| ExtractError::UnsupportedType(filename.to_string()))?;

    let text = match kind {
        DocumentKind::PlainText => String::from_utf8_lossy(bytes).into_owned(),
        DocumentKind::Docx => docx::docx_text(bytes)?,
        DocumentKind::Doc => doc::doc_text(bytes)?,
        DocumentKind::Pdf => pdf::pdf_text(bytes)?,
    };

    tracing::debug!(filename, chars = text.chars().count(), "Upload text extracted");
    Ok(keep_tail(text, MAX_EXTRACT_CHARS))
}

fn keep_tail(text: String, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    text.chars().skip(count - max_chars).collect()
}
