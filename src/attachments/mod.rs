//! Attachment resolver.
//!
//! Scans user messages for file references and turns each referenced file
//! into something the destination vendor can consume:
//!
//! | File      | Gemini                       | OpenAI                             |
//! |-----------|------------------------------|------------------------------------|
//! | image     | inline base64, link removed  | inline base64, link removed        |
//! | pdf/docx  | inline base64 + note         | extracted text between delimiters  |
//!
//! A failing file turns into a `[SYSTEM FEHLER: ...]` note in the text and
//! never affects the other references or the request.

mod reference;
mod storage;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures_util::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::agent::llm::Provider;
use crate::agent::{Attachment, Message, Role};
use crate::config::Config;
use crate::extraction::{
    DocxExtractor, ExtractionOptions, MultimodalExtractor, PdfExtractor, TextExtractor, PDF_MIME,
};
use crate::Result;

pub use reference::{classify, extension, find_references, FileKind, FileReference};
pub use storage::{FileStore, InMemoryFileStore, LocalFileStore, StoredFile};

/// Character cap for text extracted into an OpenAI message.
pub const EXTRACTED_TEXT_LIMIT: usize = 50_000;

/// Outcome of one reference.
enum Resolved {
    Skipped,
    Image(Attachment),
    InlineDocument { name: String, attachment: Attachment },
    Extracted { name: String, attachment: Attachment },
    Failed { name: String, reason: String },
}

pub struct AttachmentResolver {
    store: Arc<dyn FileStore>,
    pdf: Arc<dyn TextExtractor>,
    word: Arc<dyn TextExtractor>,
    prefixes: Vec<String>,
    extracted_text_limit: usize,
}

impl AttachmentResolver {
    pub fn new(
        store: Arc<dyn FileStore>,
        pdf: Arc<dyn TextExtractor>,
        word: Arc<dyn TextExtractor>,
        prefixes: Vec<String>,
    ) -> Self {
        Self {
            store,
            pdf,
            word,
            prefixes,
            extracted_text_limit: EXTRACTED_TEXT_LIMIT,
        }
    }

    /// Local storage plus the multimodal extraction engines from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let engine = MultimodalExtractor::new(&config.extraction, config.extraction_api_key())?;
        Ok(Self::new(
            Arc::new(LocalFileStore::new(&config.storage)),
            Arc::new(PdfExtractor::new(engine.clone())),
            Arc::new(DocxExtractor::new(engine)),
            vec![
                config.storage.upload_prefix.clone(),
                config.storage.document_prefix.clone(),
            ],
        ))
    }

    pub fn with_text_limit(mut self, limit: usize) -> Self {
        self.extracted_text_limit = limit;
        self
    }

    /// Enrich every user message of a conversation.
    pub async fn resolve_all(&self, messages: &[Message], provider: Provider) -> Vec<Message> {
        let mut out = Vec::with_capacity(messages.len());
        for message in messages {
            out.push(self.resolve(message, provider).await);
        }
        out
    }

    /// Enrich one message. Messages without references come back unchanged.
    pub async fn resolve(&self, message: &Message, provider: Provider) -> Message {
        if message.role != Role::User {
            return message.clone();
        }

        let references = find_references(&message.content, &self.prefixes);
        if references.is_empty() {
            return message.clone();
        }

        debug!("Resolving {} file reference(s) for {}", references.len(), provider);
        let outcomes = join_all(references.iter().map(|r| self.resolve_one(r, provider))).await;

        if outcomes.iter().all(|o| matches!(o, Resolved::Skipped)) {
            return message.clone();
        }

        let mut content = message.content.clone();
        let mut attachments = message.attachments.clone();
        let mut notes: Vec<String> = Vec::new();

        for (reference, outcome) in references.iter().zip(outcomes) {
            match outcome {
                Resolved::Skipped => {}
                Resolved::Image(attachment) => {
                    content = content.replacen(&reference.markdown, "", 1);
                    attachments.push(attachment);
                }
                Resolved::InlineDocument { name, attachment } => {
                    notes.push(format!("[Analysiere angehängte Datei: {}]", name));
                    attachments.push(attachment);
                }
                Resolved::Extracted { name, attachment } => {
                    notes.push(format!(
                        "--- INHALT DATEI '{}' ---\n{}\n--- ENDE DATEI INHALT ---",
                        name, attachment.payload
                    ));
                    attachments.push(attachment);
                }
                Resolved::Failed { name, reason } => {
                    notes.push(format!(
                        "[SYSTEM FEHLER: Datei '{}' konnte nicht verarbeitet werden: {}]",
                        name, reason
                    ));
                }
            }
        }

        let mut body = content.trim().to_string();
        for note in notes {
            if !body.is_empty() {
                body.push_str("\n\n");
            }
            body.push_str(&note);
        }

        message.enriched(body, attachments)
    }

    async fn resolve_one(&self, reference: &FileReference, provider: Provider) -> Resolved {
        let hinted = match extension(&reference.target) {
            Some(_) => match classify(&reference.target) {
                Some(kind) => Some(kind),
                None => {
                    debug!("Ignoring unsupported file {}", reference.target);
                    return Resolved::Skipped;
                }
            },
            None => None,
        };

        let file = match self.store.fetch(&reference.target).await {
            Ok(file) => file,
            Err(e) => {
                warn!("Failed to fetch {}: {}", reference.target, e);
                return Resolved::Failed {
                    name: reference.display_name().to_string(),
                    reason: e.to_string(),
                };
            }
        };

        let name = if file.file_name.is_empty() {
            reference.display_name().to_string()
        } else {
            file.file_name.clone()
        };

        let Some(kind) = hinted.or_else(|| classify(&name)) else {
            debug!("Ignoring unsupported file {}", name);
            return Resolved::Skipped;
        };

        match kind {
            FileKind::Image(mime) => {
                Resolved::Image(Attachment::inline(&reference.target, mime, STANDARD.encode(&file.bytes)))
            }
            FileKind::Document(mime) if provider.accepts_document_media() => {
                Resolved::InlineDocument {
                    attachment: Attachment::inline(&reference.target, mime, STANDARD.encode(&file.bytes)),
                    name,
                }
            }
            FileKind::Document(mime) => {
                let extractor = if mime == PDF_MIME { &self.pdf } else { &self.word };
                let mut options = ExtractionOptions::capped(self.extracted_text_limit)
                    .with_file_name(name.clone());
                if mime == PDF_MIME {
                    options = options.with_page_markers();
                }

                match extractor.extract(&file.bytes, &options).await {
                    Ok(extraction) => {
                        info!(
                            file = %name,
                            method = ?extraction.method,
                            truncated = extraction.metadata.truncated,
                            "Extracted attachment text"
                        );
                        Resolved::Extracted {
                            attachment: Attachment::extracted(&reference.target, mime, extraction.text),
                            name,
                        }
                    }
                    Err(e) => {
                        warn!("Extraction failed for {}: {}", name, e);
                        Resolved::Failed {
                            name,
                            reason: e.to_string(),
                        }
                    }
                }
            }
        }
    }
}
