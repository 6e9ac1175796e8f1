//! PDF engine, backed by the multimodal extractor.

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use tracing::info;

use crate::Result;

use super::multimodal::MultimodalExtractor;
use super::{Extraction, ExtractionMethod, ExtractionOptions, TextExtractor};

pub const PDF_MIME: &str = "application/pdf";

const PROMPT: &str = "Lies das angehängte PDF-Dokument und gib seinen gesamten Text wortgetreu wieder. Fasse nichts zusammen, lasse nichts aus und füge keine eigenen Kommentare hinzu.";

const PAGE_MARKER_PROMPT: &str = "Beginne jede Seite mit einer eigenen Zeile der Form '--- Seite N ---', wobei N die Seitenzahl ist.";

fn page_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*---[ \t]*Seite[ \t]+\d+[ \t]*---[ \t]*$")
            .expect("page marker pattern is valid")
    })
}

/// Split text on page markers. Empty when the text carries no markers.
pub fn split_pages(text: &str) -> Vec<String> {
    let re = page_marker();
    let starts: Vec<_> = re.find_iter(text).collect();
    if starts.is_empty() {
        return Vec::new();
    }

    starts
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let end = starts.get(i + 1).map(|n| n.start()).unwrap_or(text.len());
            text[m.end()..end].trim().to_string()
        })
        .collect()
}

#[derive(Clone)]
pub struct PdfExtractor {
    engine: MultimodalExtractor,
}

impl PdfExtractor {
    pub fn new(engine: MultimodalExtractor) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TextExtractor for PdfExtractor {
    async fn extract(&self, bytes: &[u8], options: &ExtractionOptions) -> Result<Extraction> {
        let prompt = if options.page_markers {
            format!("{} {}", PROMPT, PAGE_MARKER_PROMPT)
        } else {
            PROMPT.to_string()
        };

        let Some(text) = self.engine.extract_text(bytes, PDF_MIME, &prompt).await? else {
            info!(file = ?options.file_name, "PDF contains no extractable text");
            return Ok(Extraction::info(ExtractionMethod::MultimodalPdf));
        };

        let pages = if options.page_markers {
            split_pages(&text)
        } else {
            Vec::new()
        };

        let mut extraction = Extraction::capped(text, ExtractionMethod::MultimodalPdf, options);
        if !pages.is_empty() {
            extraction.metadata.page_count = Some(pages.len());
            extraction.metadata.pages = pages;
        }

        info!(
            file = ?options.file_name,
            chars = extraction.metadata.original_chars,
            pages = ?extraction.metadata.page_count,
            "Extracted PDF text"
        );
        Ok(extraction)
    }
}
