//! Gemini LLM client implementation (API key authentication).

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GeminiConfig;
use crate::error::Error;
use crate::tools::ToolDefinition;
use crate::Result;

use super::super::message::{Message, Role, ToolCallRequest};
use super::{GeminiResponse, LlmClient, LlmResponse, Usage};

/// Shown when the prompt or the answer was withheld for safety reasons.
pub const SAFETY_BLOCK_NOTICE: &str = "Die Anfrage konnte nicht beantwortet werden, weil sie von den Sicherheitsfiltern des Modells blockiert wurde. Bitte formuliere die Frage um.";

/// Shown when the vendor answered without any candidate.
pub const NO_CANDIDATE_NOTICE: &str = "Das Modell hat keine Antwort geliefert. Bitte versuche es erneut oder formuliere die Anfrage anders.";

/// Gemini API client using API key authentication.
#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    client: Client,
}

impl GeminiClient {
    /// Create a new Gemini client for `model`.
    pub fn new(config: &GeminiConfig, model: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature: 0.7,
            max_output_tokens: config.max_output_tokens,
            client,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn build_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    /// Thinking variants reject tool declarations.
    pub fn supports_tools(&self) -> bool {
        !self.model.contains("thinking")
    }

    fn convert_messages(&self, messages: &[Message]) -> Vec<Value> {
        let mut contents: Vec<Value> = Vec::with_capacity(messages.len());

        for m in messages.iter().filter(|m| m.role != Role::System) {
            if m.role == Role::Tool {
                let part = json!({
                    "functionResponse": {
                        "name": m.tool_name.as_deref().unwrap_or("unknown"),
                        "response": {"result": m.content}
                    }
                });

                // Results of one model turn travel together on the next user turn.
                if let Some(last) = contents.last_mut() {
                    if is_function_response_turn(last) {
                        if let Some(parts) = last["parts"].as_array_mut() {
                            parts.push(part);
                            continue;
                        }
                    }
                }
                contents.push(json!({"role": "user", "parts": [part]}));
                continue;
            }

            let role = match m.role {
                Role::Assistant => "model",
                _ => "user",
            };

            let mut parts = Vec::new();
            if !m.content.is_empty() {
                parts.push(json!({"text": m.content}));
            }

            for call in m.calls() {
                parts.push(json!({
                    "functionCall": {
                        "name": call.name,
                        "args": object_arguments(&call.arguments)
                    }
                }));
            }

            for attachment in m.attachments.iter().filter(|a| a.is_inline()) {
                parts.push(json!({
                    "inlineData": {
                        "mimeType": attachment.mime_type,
                        "data": attachment.payload
                    }
                }));
            }

            if parts.is_empty() {
                continue;
            }

            contents.push(json!({"role": role, "parts": parts}));
        }

        contents
    }

    fn system_instruction(&self, messages: &[Message], instruction: &str) -> Option<String> {
        let mut parts: Vec<&str> = Vec::new();
        if !instruction.is_empty() {
            parts.push(instruction);
        }
        parts.extend(
            messages
                .iter()
                .filter(|m| m.role == Role::System)
                .map(|m| m.content.as_str()),
        );

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    fn convert_tools(&self, tools: &[ToolDefinition]) -> Option<Value> {
        if tools.is_empty() || !self.supports_tools() {
            return None;
        }

        let function_declarations: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters
                })
            })
            .collect();

        Some(json!([{
            "functionDeclarations": function_declarations
        }]))
    }

    fn parse_response(&self, response: &GeminiResponse) -> LlmResponse {
        let usage = response
            .usage_metadata
            .as_ref()
            .map(|u| Usage {
                prompt_tokens: u.prompt_token_count.unwrap_or(0),
                completion_tokens: u.candidates_token_count.unwrap_or(0),
                total_tokens: u.total(),
            })
            .unwrap_or_default();

        if let Some(reason) = response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            warn!("Gemini blocked the prompt: {}", reason);
            return LlmResponse::blocked(SAFETY_BLOCK_NOTICE, reason, usage);
        }

        let Some(candidate) = response.candidates.first() else {
            warn!("Gemini returned no candidates");
            return LlmResponse::blocked(NO_CANDIDATE_NOTICE, "NO_CANDIDATES", usage);
        };

        let finish_reason = candidate
            .finish_reason
            .clone()
            .unwrap_or_else(|| "STOP".to_string());

        if candidate.is_safety_stop() {
            warn!("Gemini withheld the answer: {}", finish_reason);
            return LlmResponse::blocked(SAFETY_BLOCK_NOTICE, finish_reason, usage);
        }

        let parts = candidate.parts();

        // Single call in flight: only the first part is inspected.
        let tool_calls = parts
            .first()
            .and_then(|p| p.function_call.as_ref())
            .map(|fc| {
                vec![ToolCallRequest {
                    id: None,
                    name: fc.name.clone(),
                    arguments: fc.args.clone(),
                }]
            })
            .unwrap_or_default();

        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();

        LlmResponse {
            content: if text.is_empty() { None } else { Some(text) },
            tool_calls,
            finish_reason,
            usage,
            blocked: None,
        }
    }
}

fn is_function_response_turn(turn: &Value) -> bool {
    turn["role"] == "user"
        && turn["parts"]
            .as_array()
            .is_some_and(|parts| parts.iter().all(|p| p.get("functionResponse").is_some()))
}

/// Gemini wants call arguments as an object; OpenAI history stores a JSON string.
fn object_arguments(arguments: &Value) -> Value {
    match arguments {
        Value::String(encoded) => serde_json::from_str(encoded).unwrap_or_else(|_| json!({})),
        Value::Null => json!({}),
        other => other.clone(),
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn chat(
        &self,
        messages: &[Message],
        instruction: &str,
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        let mut request = json!({
            "contents": self.convert_messages(messages),
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_output_tokens
            }
        });

        if let Some(system) = self.system_instruction(messages, instruction) {
            request["systemInstruction"] = json!({
                "parts": [{"text": system}]
            });
        }

        if let Some(tool_config) = self.convert_tools(tools) {
            request["tools"] = tool_config;
        }

        debug!(model = %self.model, "Sending Gemini request");
        let response = self.client.post(self.build_url()).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::llm(
                status.as_u16(),
                format!("Gemini API error: {error_text}"),
            ));
        }

        let gemini_response: GeminiResponse = response.json().await?;
        Ok(self.parse_response(&gemini_response))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Attachment;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn client(base_url: &str, model: &str) -> GeminiClient {
        let config = GeminiConfig {
            api_key: "g-key".into(),
            base_url: base_url.into(),
            ..GeminiConfig::default()
        };
        GeminiClient::new(&config, model).unwrap()
    }

    fn parse(model: &str, body: Value) -> LlmResponse {
        let response: GeminiResponse = serde_json::from_value(body).unwrap();
        client("http://localhost", model).parse_response(&response)
    }

    #[test]
    fn test_convert_roles_and_inline_data() {
        let c = client("http://localhost", "gemini-2.0-flash");
        let user = Message::user("Was zeigt das Bild?").enriched(
            "Was zeigt das Bild?".into(),
            vec![Attachment::inline("/uploads/a.png", "image/png", "iVBOR".into())],
        );
        let contents = c.convert_messages(&[
            Message::system("ignored here"),
            user,
            Message::assistant("Ein Hund."),
        ]);

        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(contents[0]["parts"][1]["inlineData"]["data"], "iVBOR");
        assert_eq!(contents[1]["role"], "model");
    }

    #[test]
    fn test_function_response_keyed_by_name() {
        let c = client("http://localhost", "gemini-2.0-flash");
        let call = ToolCallRequest {
            id: None,
            name: "search_web".into(),
            arguments: json!({"query": "rust"}),
        };
        let contents = c.convert_messages(&[
            Message::user("Suche"),
            Message::assistant_with_tools("", vec![call.clone()]),
            Message::tool_result(&call, "digest"),
        ]);

        assert_eq!(contents[1]["parts"][0]["functionCall"]["name"], "search_web");
        assert_eq!(contents[2]["role"], "user");
        let response = &contents[2]["parts"][0]["functionResponse"];
        assert_eq!(response["name"], "search_web");
        assert_eq!(response["response"]["result"], "digest");
    }

    #[test]
    fn test_tools_omitted_for_thinking_models() {
        let tools = vec![ToolDefinition::search_web()];
        assert!(client("http://x", "gemini-2.0-flash").convert_tools(&tools).is_some());
        assert!(client("http://x", "gemini-2.0-flash-thinking-exp")
            .convert_tools(&tools)
            .is_none());
    }

    #[test]
    fn test_parse_first_part_function_call_only() {
        let resp = parse(
            "gemini-2.0-flash",
            json!({
                "candidates": [{"content": {"parts": [
                    {"functionCall": {"name": "search_web", "args": {"query": "a"}}},
                    {"functionCall": {"name": "search_web", "args": {"query": "b"}}}
                ]}}],
                "usageMetadata": {"totalTokenCount": 42}
            }),
        );
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].arguments["query"], "a");
        assert!(resp.tool_calls[0].id.is_none());
        assert_eq!(resp.usage.total_tokens, 42);

        let resp = parse(
            "gemini-2.0-flash",
            json!({"candidates": [{"content": {"parts": [
                {"text": "Ich suche."},
                {"functionCall": {"name": "search_web", "args": {"query": "a"}}}
            ]}}]}),
        );
        assert!(!resp.has_tool_calls());
        assert_eq!(resp.content.as_deref(), Some("Ich suche."));
    }

    #[test]
    fn test_parse_blocked_prompt_and_empty_candidates() {
        let resp = parse(
            "gemini-2.0-flash",
            json!({"promptFeedback": {"blockReason": "SAFETY"}, "usageMetadata": {"totalTokenCount": 7}}),
        );
        assert_eq!(resp.blocked.as_deref(), Some(SAFETY_BLOCK_NOTICE));
        assert_eq!(resp.usage.total_tokens, 7);

        let resp = parse("gemini-2.0-flash", json!({"candidates": []}));
        assert_eq!(resp.blocked.as_deref(), Some(NO_CANDIDATE_NOTICE));

        let resp = parse("gemini-2.0-flash", json!({"candidates": [{"finishReason": "SAFETY"}]}));
        assert_eq!(resp.blocked.as_deref(), Some(SAFETY_BLOCK_NOTICE));
    }

    #[tokio::test]
    async fn test_chat_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .and(query_param("key", "g-key"))
            .respond_with(|req: &Request| {
                let body: Value = serde_json::from_slice(&req.body).unwrap();
                assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Sei knapp.");
                assert_eq!(
                    body["tools"][0]["functionDeclarations"][0]["name"],
                    "search_web"
                );
                ResponseTemplate::new(200).set_body_json(json!({
                    "candidates": [{"content": {"parts": [{"text": "Hallo"}]}, "finishReason": "STOP"}],
                    "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 2, "totalTokenCount": 5}
                }))
            })
            .expect(1)
            .mount(&server)
            .await;

        let c = client(&server.uri(), "gemini-2.0-flash");
        let resp = c
            .chat(&[Message::user("Hi")], "Sei knapp.", &[ToolDefinition::search_web()])
            .await
            .unwrap();
        assert_eq!(resp.content.as_deref(), Some("Hallo"));
        assert_eq!(resp.usage.total_tokens, 5);
    }

    #[tokio::test]
    async fn test_chat_non_2xx_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let err = client(&server.uri(), "gemini-2.0-flash")
            .chat(&[Message::user("Hi")], "", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Llm { status: 400, .. }));
    }
}
