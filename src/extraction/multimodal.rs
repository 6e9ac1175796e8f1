//! Multimodal extraction: the file goes to Gemini as inline data together
//! with an extraction prompt, the first candidate's text comes back.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::agent::llm::GeminiResponse;
use crate::config::ExtractionConfig;
use crate::error::Error;
use crate::Result;

/// The model answers with this when a document has no text at all.
pub const EMPTY_SENTINEL: &str = "[[KEIN_TEXT]]";

#[derive(Clone)]
pub struct MultimodalExtractor {
    api_key: String,
    base_url: String,
    model: String,
    client: Client,
}

impl MultimodalExtractor {
    pub fn new(config: &ExtractionConfig, api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            api_key: api_key.to_string(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client,
        })
    }

    /// Run one extraction. `Ok(None)` means the document has no text.
    pub async fn extract_text(
        &self,
        bytes: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<Option<String>> {
        if self.api_key.is_empty() {
            return Err(Error::Config(
                "No API key configured for document extraction".to_string(),
            ));
        }

        let request = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {"inlineData": {"mimeType": mime_type, "data": STANDARD.encode(bytes)}},
                    {"text": format!("{}\n\nEnthält das Dokument keinerlei Text, antworte ausschließlich mit {}.", prompt, EMPTY_SENTINEL)}
                ]
            }],
            "generationConfig": {"temperature": 0.0}
        });

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        debug!(model = %self.model, mime_type, bytes = bytes.len(), "Sending extraction request");
        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Extraction(format!(
                "extraction API returned {}: {}",
                status.as_u16(),
                error_text
            )));
        }

        let parsed: GeminiResponse = response.json().await?;
        if parsed.candidates.is_empty() {
            warn!("Extraction returned no candidates");
            return Ok(None);
        }

        let text = parsed.first_text().unwrap_or_default();
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == EMPTY_SENTINEL {
            return Ok(None);
        }

        Ok(Some(trimmed.to_string()))
    }
}
