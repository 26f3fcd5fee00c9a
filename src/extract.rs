//! Turning uploaded document bytes into plain text.

use std::path::Path;
use thiserror::Error;

/// Errors produced while extracting text from a document.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// No extractor exists for this file extension.
    #[error("Unsupported document type: {0}")]
    UnsupportedType(String),
    /// The document could not be decoded or contained no text.
    #[error("Failed to extract text: {0}")]
    ExtractionFailed(String),
}

/// Source of plain text for a document.
///
/// Extraction may be CPU heavy (PDF parsing), so callers run it on a blocking thread.
pub trait TextExtractor: Send + Sync {
    /// Extract text from `bytes`, choosing the decoder by `extension` (without the dot).
    fn extract(&self, bytes: &[u8], extension: &str) -> Result<String, ExtractionError>;

    /// Whether `extension` is handled by [`TextExtractor::extract`].
    fn supports(&self, extension: &str) -> bool;
}

/// Extractor for plain text, Markdown, and PDF documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentExtractor;

const TEXT_EXTENSIONS: [&str; 2] = ["txt", "md"];

impl TextExtractor for DocumentExtractor {
    fn extract(&self, bytes: &[u8], extension: &str) -> Result<String, ExtractionError> {
        let extension = extension.to_ascii_lowercase();
        let text = if TEXT_EXTENSIONS.contains(&extension.as_str()) {
            String::from_utf8_lossy(bytes).into_owned()
        } else if extension == "pdf" {
            pdf_extract::extract_text_from_mem(bytes)
                .map_err(|error| ExtractionError::ExtractionFailed(error.to_string()))?
        } else {
            return Err(ExtractionError::UnsupportedType(extension));
        };

        if text.trim().is_empty() {
            tracing::warn!(extension = %extension, "Document produced no text");
            return Err(ExtractionError::ExtractionFailed(
                "document contains no text".into(),
            ));
        }
        Ok(text)
    }

    fn supports(&self, extension: &str) -> bool {
        let extension = extension.to_ascii_lowercase();
        extension == "pdf" || TEXT_EXTENSIONS.contains(&extension.as_str())
    }
}

/// Lower-cased extension of `filename`, or an empty string when it has none.
pub fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}
