//! Shared types for Gemini API responses.
//!
//! These types are shared between `GeminiClient` (chat) and the multimodal
//! extraction engine to avoid duplication.

use serde::Deserialize;
use serde_json::Value;

/// Top-level Gemini API response.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
    pub usage_metadata: Option<UsageMetadata>,
}

/// Present when the prompt itself was rejected.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

/// A single response candidate.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Missing when the candidate was stopped for safety.
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

/// Content block containing parts.
#[derive(Debug, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// A single part of the response (text or function call).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub text: Option<String>,
    pub function_call: Option<FunctionCall>,
}

/// Function call requested by the model.
#[derive(Debug, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// Token usage metadata.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    pub prompt_token_count: Option<usize>,
    pub candidates_token_count: Option<usize>,
    pub total_token_count: Option<usize>,
}

/// Finish reasons that mean the answer was withheld.
pub const SAFETY_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
    "RECITATION",
];

impl GeminiResponse {
    /// Concatenated text of the first candidate.
    pub fn first_text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        Some(text)
    }
}

impl Candidate {
    pub fn parts(&self) -> &[Part] {
        self.content.as_ref().map(|c| c.parts.as_slice()).unwrap_or(&[])
    }

    pub fn is_safety_stop(&self) -> bool {
        self.finish_reason
            .as_deref()
            .is_some_and(|r| SAFETY_FINISH_REASONS.contains(&r))
    }
}

impl UsageMetadata {
    /// Total tokens, summing the parts when the total is absent.
    pub fn total(&self) -> usize {
        self.total_token_count.unwrap_or_else(|| {
            self.prompt_token_count.unwrap_or(0) + self.candidates_token_count.unwrap_or(0)
        })
    }
}
