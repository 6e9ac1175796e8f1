//! OpenAI chat completions client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::OpenAiConfig;
use crate::error::Error;
use crate::tools::ToolDefinition;
use crate::Result;

use super::super::message::{Message, Role, ToolCallRequest};
use super::{LlmClient, LlmResponse, Usage};

/// OpenAI API client using bearer authentication.
#[derive(Clone)]
pub struct OpenAiClient {
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunction,
}

#[derive(Debug, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
    #[serde(default)]
    total_tokens: usize,
}

impl OpenAiClient {
    /// Create a new OpenAI client for `model`.
    pub fn new(config: &OpenAiConfig, model: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature: 0.7,
            client,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Reasoning models (o1, o3, ...) only accept the default temperature.
    fn supports_temperature(&self) -> bool {
        !(self.model.starts_with("o1") || self.model.starts_with("o3") || self.model.starts_with("o4"))
    }

    fn convert_messages(&self, messages: &[Message], instruction: &str) -> Vec<Value> {
        let mut out = Vec::with_capacity(messages.len() + 1);
        if !instruction.is_empty() {
            out.push(json!({"role": "system", "content": instruction}));
        }

        for m in messages {
            let turn = match m.role {
                Role::System => json!({"role": "system", "content": m.content}),
                Role::Tool => json!({
                    "role": "tool",
                    "tool_call_id": m.tool_call_id.as_deref().unwrap_or_default(),
                    "content": m.content
                }),
                Role::Assistant if !m.calls().is_empty() => {
                    let calls: Vec<Value> = m.calls().iter().map(api_tool_call).collect();
                    let content = if m.content.is_empty() {
                        Value::Null
                    } else {
                        Value::String(m.content.clone())
                    };
                    json!({"role": "assistant", "content": content, "tool_calls": calls})
                }
                Role::Assistant => json!({"role": "assistant", "content": m.content}),
                Role::User if m.attachments.iter().any(|a| a.is_inline()) => json!({
                    "role": "user",
                    "content": content_parts(m)
                }),
                Role::User => json!({"role": "user", "content": m.content}),
            };
            out.push(turn);
        }

        out
    }

    fn convert_tools(tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters
                    }
                })
            })
            .collect()
    }

    fn parse_response(&self, response: ApiResponse) -> Result<LlmResponse> {
        let usage = response
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens.max(u.prompt_tokens + u.completion_tokens),
            })
            .unwrap_or_default();

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::llm(200, "No choices in OpenAI response"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCallRequest {
                id: Some(tc.id),
                name: tc.function.name,
                arguments: Value::String(tc.function.arguments.unwrap_or_default()),
            })
            .collect();

        Ok(LlmResponse {
            content: choice.message.content.filter(|c| !c.is_empty()),
            tool_calls,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage,
            blocked: None,
        })
    }
}

/// Tool call as echoed back in an assistant turn. Arguments stay the
/// JSON-encoded string the vendor produced.
fn api_tool_call(call: &ToolCallRequest) -> Value {
    let arguments = match &call.arguments {
        Value::String(encoded) => encoded.clone(),
        other => other.to_string(),
    };
    json!({
        "id": call.id.as_deref().unwrap_or_default(),
        "type": "function",
        "function": {"name": call.name, "arguments": arguments}
    })
}

/// Text part plus one image part per inlined image.
fn content_parts(m: &Message) -> Vec<Value> {
    let mut parts = vec![json!({"type": "text", "text": m.content})];
    for attachment in m.attachments.iter().filter(|a| a.is_inline()) {
        if !attachment.is_image() {
            warn!(
                "Skipping inline {} attachment {}: not supported by OpenAI",
                attachment.mime_type, attachment.source_reference
            );
            continue;
        }
        parts.push(json!({
            "type": "image_url",
            "image_url": {"url": format!("data:{};base64,{}", attachment.mime_type, attachment.payload)}
        }));
    }
    parts
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(
        &self,
        messages: &[Message],
        instruction: &str,
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        let mut request = json!({
            "model": self.model,
            "messages": self.convert_messages(messages, instruction),
        });

        if self.supports_temperature() {
            request["temperature"] = json!(self.temperature);
        }

        if !tools.is_empty() {
            request["tools"] = json!(Self::convert_tools(tools));
        }

        debug!(model = %self.model, "Sending OpenAI request");
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::llm(
                status.as_u16(),
                format!("OpenAI API error: {error_text}"),
            ));
        }

        let api_response: ApiResponse = response.json().await?;
        self.parse_response(api_response)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
