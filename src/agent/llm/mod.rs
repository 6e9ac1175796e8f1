//! LLM client abstraction layer.
//!
//! This module provides:
//! - [`LlmClient`] trait for swappable LLM providers
//! - [`ProviderRegistry`] for per-request client creation
//! - Concrete implementations: OpenAI chat completions, Gemini generateContent
//!
//! Clients only convert messages to the vendor wire shape and parse one
//! response. The iteration, budget and usage skeleton is shared and lives
//! in [`super::AgentLoop`].

mod types;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::tools::ToolDefinition;
use crate::Result;

pub use types::*;

pub mod gemini;
pub mod openai;

pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

use super::message::{Message, ToolCallRequest};

/// Destination vendor of a chat request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "OpenAI", alias = "openai")]
    OpenAi,
    #[serde(rename = "Gemini", alias = "gemini")]
    Gemini,
}

impl Provider {
    /// Whether the vendor takes PDF/Word files as inline media.
    pub fn accepts_document_media(self) -> bool {
        matches!(self, Provider::Gemini)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "OpenAI",
            Provider::Gemini => "Gemini",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "gemini" => Ok(Provider::Gemini),
            other => Err(Error::InvalidRequest(format!("Unknown provider: {other}"))),
        }
    }
}

/// Response from an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Text content of the response.
    pub content: Option<String>,

    /// Tool calls requested by the LLM.
    pub tool_calls: Vec<ToolCallRequest>,

    /// Reason the response finished.
    pub finish_reason: String,

    /// Token usage statistics.
    pub usage: Usage,

    /// User-facing notice when the vendor refused to answer.
    pub blocked: Option<String>,
}

impl LlmResponse {
    /// Create a simple text response.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: vec![],
            finish_reason: "stop".to_string(),
            usage: Usage::default(),
            blocked: None,
        }
    }

    /// Create a refusal carrying an explanatory notice.
    pub fn blocked(notice: impl Into<String>, finish_reason: impl Into<String>, usage: Usage) -> Self {
        Self {
            content: None,
            tool_calls: vec![],
            finish_reason: finish_reason.into(),
            usage,
            blocked: Some(notice.into()),
        }
    }

    /// Check if response has tool calls.
    #[inline]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }
}

/// Token usage information. Absent vendor fields count as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

impl Usage {
    pub fn total(total_tokens: usize) -> Self {
        Self {
            total_tokens,
            ..Self::default()
        }
    }
}

/// LLM client trait — swappable provider abstraction.
///
/// Implement this trait to add a new LLM provider.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send the conversation, system instruction and tool declarations; parse one response.
    async fn chat(
        &self,
        messages: &[Message],
        instruction: &str,
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse>;

    /// Model this client talks to.
    fn model(&self) -> &str;
}

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for Box<T> {
    async fn chat(
        &self,
        messages: &[Message],
        instruction: &str,
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        (**self).chat(messages, instruction, tools).await
    }

    fn model(&self) -> &str {
        (**self).model()
    }
}

/// Provider registry — creates LLM clients per request.
///
/// # Example
///
/// ```ignore
/// let client = ProviderRegistry::create(&config, Provider::Gemini, Some("fast"), 0.5)?;
/// let response = client.chat(&messages, &instruction, &tools).await?;
/// ```
pub struct ProviderRegistry;

impl ProviderRegistry {
    /// Create an LLM client from configuration.
    ///
    /// A missing API key is a configuration error and aborts the request.
    pub fn create(
        config: &Config,
        provider: Provider,
        mode: Option<&str>,
        temperature: f32,
    ) -> Result<Box<dyn LlmClient>> {
        match provider {
            Provider::OpenAi => {
                if config.openai.api_key.is_empty() {
                    return Err(Error::Config("OpenAI API key is not set".to_string()));
                }
                let model = config.openai.model_for(mode);
                let client = OpenAiClient::new(&config.openai, model)?.with_temperature(temperature);
                Ok(Box::new(client))
            }
            Provider::Gemini => {
                if config.gemini.api_key.is_empty() {
                    return Err(Error::Config("Gemini API key is not set".to_string()));
                }
                let model = config.gemini.model_for(mode);
                let client = GeminiClient::new(&config.gemini, model)?.with_temperature(temperature);
                Ok(Box::new(client))
            }
        }
    }
}

/// Fake LLM client for testing.
#[cfg(test)]
pub struct FakeLlmClient {
    responses: std::sync::Mutex<std::collections::VecDeque<LlmResponse>>,
    /// Conversation each call received.
    pub seen: std::sync::Mutex<Vec<Vec<Message>>>,
}

#[cfg(test)]
impl FakeLlmClient {
    /// Create with predefined text responses.
    pub fn new(responses: Vec<&str>) -> Self {
        Self::scripted(responses.iter().map(|s| LlmResponse::text(*s)).collect())
    }

    /// Create with arbitrary predefined responses.
    pub fn scripted(responses: Vec<LlmResponse>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
            seen: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// A response asking for one tool call.
    pub fn tool_call_response(id: Option<&str>, name: &str, args: serde_json::Value) -> LlmResponse {
        LlmResponse {
            content: None,
            tool_calls: vec![ToolCallRequest {
                id: id.map(str::to_string),
                name: name.to_string(),
                arguments: args,
            }],
            finish_reason: "tool_calls".to_string(),
            usage: Usage::default(),
            blocked: None,
        }
    }

    /// Create with a single tool call followed by a text response.
    pub fn with_tool_call(name: &str, args: serde_json::Value, final_response: &str) -> Self {
        Self::scripted(vec![
            Self::tool_call_response(Some("tc_1"), name, args),
            LlmResponse::text(final_response),
        ])
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[cfg(test)]
#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn chat(
        &self,
        messages: &[Message],
        _instruction: &str,
        _tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        self.seen.lock().unwrap().push(messages.to_vec());
        let mut responses = self.responses.lock().unwrap();
        responses
            .pop_front()
            .ok_or_else(|| Error::llm(500, "No more fake responses"))
    }

    fn model(&self) -> &str {
        "fake-model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_llm_client() {
        let client = FakeLlmClient::new(vec!["Hello!", "World!"]);

        let resp1 = client.chat(&[], "", &[]).await.unwrap();
        assert_eq!(resp1.content.as_deref(), Some("Hello!"));

        let resp2 = client.chat(&[], "", &[]).await.unwrap();
        assert_eq!(resp2.content.as_deref(), Some("World!"));
        assert_eq!(client.calls(), 2);
    }

    #[test]
    fn test_provider_serde_names() {
        let p: Provider = serde_json::from_str("\"OpenAI\"").unwrap();
        assert_eq!(p, Provider::OpenAi);
        let p: Provider = serde_json::from_str("\"Gemini\"").unwrap();
        assert_eq!(p, Provider::Gemini);
        assert_eq!(serde_json::to_string(&Provider::OpenAi).unwrap(), "\"OpenAI\"");
        assert!("claude".parse::<Provider>().is_err());
    }

    #[test]
    fn test_registry_requires_api_key() {
        let config = Config::default();
        let err = ProviderRegistry::create(&config, Provider::OpenAi, None, 0.5).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_registry_selects_mode_model() {
        let mut config = Config::default();
        config.gemini.api_key = "g".into();
        let client = ProviderRegistry::create(&config, Provider::Gemini, Some("thinking"), 0.5).unwrap();
        assert!(client.model().contains("thinking"));
    }
}
