//! Document ingestion: receive an uploaded PDF/DOCX, keep it on disk, and
//! turn it into plain text for the analyzer.

use thiserror::Error;

use crate::errors::AppError;

pub mod extract;
pub mod upload;

pub use upload::{receive_document, StoredUpload};

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_DOC: &str = "application/msword";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
}

impl DocumentKind {
    /// Resolves the declared MIME type, falling back to the file extension
    /// when the client sent a generic type.
    pub fn detect(content_type: Option<&str>, file_name: Option<&str>) -> Result<Self, DocumentError> {
        match content_type {
            Some(MIME_PDF) => return Ok(DocumentKind::Pdf),
            Some(MIME_DOCX) | Some(MIME_DOC) => return Ok(DocumentKind::Docx),
            None | Some("application/octet-stream") => {}
            Some(other) => return Err(DocumentError::Unsupported(other.to_string())),
        }
        let ext = file_name
            .and_then(|n| n.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("pdf") => Ok(DocumentKind::Pdf),
            Some("docx") | Some("doc") => Ok(DocumentKind::Docx),
            _ => Err(DocumentError::Unsupported(
                content_type.unwrap_or("unknown").to_string(),
            )),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => ".pdf",
            DocumentKind::Docx => ".docx",
        }
    }
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Unsupported file type ({0}). Please upload PDF or DOCX files.")]
    Unsupported(String),

    #[error("Failed to parse PDF file")]
    Pdf(String),

    #[error("Failed to parse DOCX file")]
    Docx(String),

    #[error("No readable text found in the uploaded file")]
    Empty,
}

impl From<DocumentError> for AppError {
    fn from(e: DocumentError) -> Self {
        match e {
            DocumentError::Unsupported(_) => AppError::UnsupportedMedia(e.to_string()),
            DocumentError::Pdf(ref detail) | DocumentError::Docx(ref detail) => {
                tracing::warn!("Document extraction failed: {detail}");
                AppError::Validation(e.to_string())
            }
            DocumentError::Empty => AppError::Validation(e.to_string()),
        }
    }
}

/// Collapses every whitespace run into a single space.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_collapses_whitespace() {
        let raw = "  Senior   Engineer\n\n\nRust\t\tTokio \r\n ";
        assert_eq!(clean_text(raw), "Senior Engineer Rust Tokio");
    }

    #[test]
    fn test_detect_by_mime() {
        assert_eq!(DocumentKind::detect(Some(MIME_PDF), None).unwrap(), DocumentKind::Pdf);
        assert_eq!(DocumentKind::detect(Some(MIME_DOCX), None).unwrap(), DocumentKind::Docx);
        assert_eq!(DocumentKind::detect(Some(MIME_DOC), None).unwrap(), DocumentKind::Docx);
    }

    #[test]
    fn test_detect_octet_stream_uses_extension() {
        let kind = DocumentKind::detect(Some("application/octet-stream"), Some("CV.PDF")).unwrap();
        assert_eq!(kind, DocumentKind::Pdf);
    }

    #[test]
    fn test_detect_rejects_images() {
        let err = DocumentKind::detect(Some("image/png"), Some("cv.pdf")).unwrap_err();
        assert!(matches!(err, DocumentError::Unsupported(_)));
    }

    #[test]
    fn test_detect_rejects_unknown_extension() {
        assert!(DocumentKind::detect(None, Some("notes.txt")).is_err());
        assert!(DocumentKind::detect(None, None).is_err());
    }

    #[test]
    fn test_unsupported_maps_to_415() {
        let err: AppError = DocumentError::Unsupported("image/png".into()).into();
        assert!(matches!(err, AppError::UnsupportedMedia(_)));
    }
}
