//! Word engine: offline DOCX parsing with a multimodal fallback.
//!
//! Legacy `.doc` files (OLE compound documents) have no XML parts and always
//! take the fallback path.

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use std::io::{Cursor, Read};
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::error::Error;
use crate::Result;

use super::multimodal::MultimodalExtractor;
use super::{Extraction, ExtractionMethod, ExtractionOptions, TextExtractor};

pub const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const DOC_MIME: &str = "application/msword";

const DOC_XML_PATH: &str = "word/document.xml";

/// OLE compound file signature used by `.doc`.
const OLE_SIGNATURE: [u8; 4] = [0xD0, 0xCF, 0x11, 0xE0];

const PROMPT: &str = "Lies das angehängte Word-Dokument und gib seinen gesamten Text wortgetreu wieder. Erhalte Absätze und Aufzählungen, fasse nichts zusammen und füge keine eigenen Kommentare hinzu.";

fn is_legacy_doc(bytes: &[u8], file_name: Option<&str>) -> bool {
    bytes.starts_with(&OLE_SIGNATURE)
        || file_name.is_some_and(|n| n.to_ascii_lowercase().ends_with(".doc"))
}

/// Read the text of a DOCX container, one line per paragraph.
pub fn parse_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::Extraction(format!("failed to open docx archive: {e}")))?;

    let mut file = archive
        .by_name(DOC_XML_PATH)
        .map_err(|e| Error::Extraction(format!("docx missing document.xml: {e}")))?;

    let mut xml = String::new();
    file.read_to_string(&mut xml)?;

    paragraphs_text(&xml)
}

fn paragraphs_text(xml: &str) -> Result<String> {
    let mut reader = XmlReader::from_str(xml);
    let mut buf = Vec::new();
    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:t" => in_text = true,
                b"w:tab" => line.push('\t'),
                b"w:br" | b"w:cr" => line.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => line.push('\t'),
                b"w:br" | b"w:cr" => line.push('\n'),
                // Self-closing paragraph: blank line
                b"w:p" => lines.push(String::new()),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let content = t
                    .unescape()
                    .map_err(|e| Error::Extraction(format!("invalid text in document.xml: {e}")))?;
                line.push_str(&content);
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => lines.push(std::mem::take(&mut line)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::Extraction(format!(
                    "malformed document.xml at {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    if !line.is_empty() {
        lines.push(line);
    }

    Ok(lines.join("\n").trim().to_string())
}

#[derive(Clone)]
pub struct DocxExtractor {
    engine: MultimodalExtractor,
}

impl DocxExtractor {
    pub fn new(engine: MultimodalExtractor) -> Self {
        Self { engine }
    }

    async fn fallback(&self, bytes: &[u8], mime_type: &str, options: &ExtractionOptions) -> Result<Extraction> {
        match self.engine.extract_text(bytes, mime_type, PROMPT).await? {
            Some(text) => Ok(Extraction::capped(text, ExtractionMethod::MultimodalDocument, options)),
            None => {
                info!(file = ?options.file_name, "Word document contains no extractable text");
                Ok(Extraction::info(ExtractionMethod::MultimodalDocument))
            }
        }
    }
}

#[async_trait]
impl TextExtractor for DocxExtractor {
    async fn extract(&self, bytes: &[u8], options: &ExtractionOptions) -> Result<Extraction> {
        if is_legacy_doc(bytes, options.file_name.as_deref()) {
            debug!(file = ?options.file_name, "Legacy .doc, using multimodal extraction");
            return self.fallback(bytes, DOC_MIME, options).await;
        }

        match parse_docx(bytes) {
            Ok(text) if !text.trim().is_empty() => {
                info!(file = ?options.file_name, chars = text.len(), "Parsed DOCX offline");
                Ok(Extraction::capped(text, ExtractionMethod::OfficeXml, options))
            }
            Ok(_) => {
                warn!(file = ?options.file_name, "DOCX parser produced empty text, falling back");
                self.fallback(bytes, DOCX_MIME, options).await
            }
            Err(e) => {
                warn!(file = ?options.file_name, "DOCX parser failed ({}), falling back", e);
                self.fallback(bytes, DOCX_MIME, options).await
            }
        }
    }
}
