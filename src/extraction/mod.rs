//! Text extraction engines for stored documents.
//!
//! Engines turn raw file bytes into plain text. They hold no mutable state,
//! never touch the stored bytes, and return the same text for the same input.
//! An empty document is an [`Extraction::info`] value, not an error; only
//! transport and configuration failures are returned as `Err`.

mod docx;
mod multimodal;
mod pdf;

use async_trait::async_trait;
use serde::Serialize;

use crate::agent::tokens::truncate_chars;
use crate::Result;

pub use docx::{parse_docx, DocxExtractor, DOC_MIME, DOCX_MIME};
pub use multimodal::{MultimodalExtractor, EMPTY_SENTINEL};
pub use pdf::{split_pages, PdfExtractor, PDF_MIME};

/// Returned as text when a document holds nothing extractable.
pub const EMPTY_DOCUMENT_INFO: &str =
    "Hinweis: Aus dieser Datei konnte kein Text extrahiert werden (leeres oder rein grafisches Dokument).";

/// Extractor contract shared by the PDF and Word engines.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, bytes: &[u8], options: &ExtractionOptions) -> Result<Extraction>;
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionOptions {
    /// Character cap; longer text is cut and gets a truncation marker.
    pub max_chars: Option<usize>,
    /// Ask for `--- Seite N ---` markers (PDF only).
    pub page_markers: bool,
    /// Stored file name, used for format detection and logging.
    pub file_name: Option<String>,
}

impl ExtractionOptions {
    pub fn capped(max_chars: usize) -> Self {
        Self {
            max_chars: Some(max_chars),
            ..Self::default()
        }
    }

    pub fn with_page_markers(mut self) -> Self {
        self.page_markers = true;
        self
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }
}

/// Which path produced the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMethod {
    /// PDF read by the multimodal model
    MultimodalPdf,
    /// DOCX parsed offline from its XML parts
    OfficeXml,
    /// Word file read by the multimodal model
    MultimodalDocument,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pages: Vec<String>,
    pub truncated: bool,
    /// Character count before truncation
    pub original_chars: usize,
    /// The document held no text; `text` is an info notice
    pub empty: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    pub text: String,
    #[serde(rename = "extractionMethod")]
    pub method: ExtractionMethod,
    pub metadata: ExtractionMetadata,
}

impl Extraction {
    /// Structured "nothing found" result.
    pub fn info(method: ExtractionMethod) -> Self {
        Self {
            text: EMPTY_DOCUMENT_INFO.to_string(),
            method,
            metadata: ExtractionMetadata {
                empty: true,
                ..ExtractionMetadata::default()
            },
        }
    }

    /// Wrap extracted text, applying the character cap from `options`.
    pub fn capped(text: String, method: ExtractionMethod, options: &ExtractionOptions) -> Self {
        let original_chars = text.chars().count();
        let (text, truncated) = match options.max_chars.and_then(|max| truncate_chars(&text, max)) {
            Some(cut) => (
                format!(
                    "{}\n\n[... Text gekürzt: {} von {} Zeichen]",
                    cut,
                    cut.chars().count(),
                    original_chars
                ),
                true,
            ),
            None => (text, false),
        };

        Self {
            text,
            method,
            metadata: ExtractionMetadata {
                truncated,
                original_chars,
                ..ExtractionMetadata::default()
            },
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.metadata.empty
    }
}
