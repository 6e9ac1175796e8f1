//! Chat service: one request in, one reply out.
//!
//! A request passes through these steps:
//! 1. validate and build the provider client (missing key aborts)
//! 2. look up the chat's project and assemble the system instruction
//! 3. resolve file references in user messages
//! 4. run the bounded tool loop
//! 5. record usage in the background

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::agent::llm::{Provider, ProviderRegistry};
use crate::agent::{AgentLoop, ContextAssembler, LoopOutcome, Message};
use crate::attachments::AttachmentResolver;
use crate::config::Config;
use crate::error::Error;
use crate::projects::{JsonProjectStore, ProjectContext, ProjectSource};
use crate::tools::{BraveSearch, ToolExecutor};
use crate::usage::{spawn_record, JsonlUsageSink, TracingUsageSink, UsageRecord, UsageSink};
use crate::Result;

fn default_temperature() -> f32 {
    0.5
}

/// Inbound chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub provider: Provider,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub chat_id: Option<String>,
    /// Custom persona replacing the temperature tier text
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl ChatRequest {
    pub fn new(provider: Provider, messages: Vec<Message>) -> Self {
        Self {
            messages,
            provider,
            mode: None,
            temperature: default_temperature(),
            chat_id: None,
            system_prompt: None,
        }
    }
}

/// Authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestScope {
    pub user_id: String,
    pub tenant_id: String,
}

impl RequestScope {
    pub fn new(user_id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            tenant_id: tenant_id.into(),
        }
    }
}

/// Wire response body: `{message}` or `{error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatResponse {
    Message { message: String },
    Error { error: String },
}

/// Successful reply with accounting.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub content: String,
    pub tokens: usize,
    pub outcome: LoopOutcome,
    pub model: String,
}

pub struct ChatService {
    config: Config,
    assembler: ContextAssembler,
    resolver: AttachmentResolver,
    executor: ToolExecutor,
    projects: Option<Arc<dyn ProjectSource>>,
    usage: Arc<dyn UsageSink>,
}

impl ChatService {
    pub fn new(
        config: Config,
        resolver: AttachmentResolver,
        executor: ToolExecutor,
        projects: Option<Arc<dyn ProjectSource>>,
        usage: Arc<dyn UsageSink>,
    ) -> Self {
        Self {
            config,
            assembler: ContextAssembler::new(),
            resolver,
            executor,
            projects,
            usage,
        }
    }

    /// Wire up the production collaborators described by `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        let resolver = AttachmentResolver::from_config(&config)?;
        let executor = ToolExecutor::new(Arc::new(BraveSearch::new(&config.search)?));
        let projects = config
            .projects_file
            .as_ref()
            .map(|path| Arc::new(JsonProjectStore::new(path)) as Arc<dyn ProjectSource>);
        let usage: Arc<dyn UsageSink> = match &config.usage_log {
            Some(path) => Arc::new(JsonlUsageSink::new(path)),
            None => Arc::new(TracingUsageSink),
        };

        Ok(Self::new(config, resolver, executor, projects, usage))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Process one request.
    pub async fn handle(&self, request: ChatRequest, scope: &RequestScope) -> Result<ChatReply> {
        let span = info_span!(
            "chat",
            request_id = %Uuid::new_v4(),
            provider = %request.provider,
            user_id = %scope.user_id,
            tenant_id = %scope.tenant_id
        );
        self.process(request, scope).instrument(span).await
    }

    async fn process(&self, request: ChatRequest, scope: &RequestScope) -> Result<ChatReply> {
        if request.messages.is_empty() {
            return Err(Error::InvalidRequest("messages must not be empty".to_string()));
        }

        let temperature = if request.temperature.is_finite() {
            request.temperature.clamp(0.0, 1.0)
        } else {
            default_temperature()
        };

        let client = ProviderRegistry::create(
            &self.config,
            request.provider,
            request.mode.as_deref(),
            temperature,
        )?;
        let model = client.model().to_string();

        let project = self.project(request.chat_id.as_deref()).await;
        let instruction =
            self.assembler
                .build(temperature, request.system_prompt.as_deref(), project.as_ref());

        let messages = self.resolver.resolve_all(&request.messages, request.provider).await;

        let agent = AgentLoop::new(client, self.executor.clone(), self.config.max_iterations);
        let result = agent.run(messages, &instruction).await?;

        info!(
            model = %model,
            outcome = ?result.outcome,
            iterations = result.iterations,
            tokens = result.tokens,
            "Chat request completed"
        );

        spawn_record(
            self.usage.clone(),
            UsageRecord {
                user_id: scope.user_id.clone(),
                tenant_id: scope.tenant_id.clone(),
                provider: request.provider.to_string(),
                model: model.clone(),
                total_tokens: result.tokens,
                timestamp: chrono::Utc::now(),
            },
        );

        Ok(ChatReply {
            content: result.content,
            tokens: result.tokens,
            outcome: result.outcome,
            model,
        })
    }

    async fn project(&self, chat_id: Option<&str>) -> Option<ProjectContext> {
        let (source, chat_id) = (self.projects.as_ref()?, chat_id?);
        match source.project_for_chat(chat_id).await {
            Ok(project) => project,
            Err(e) => {
                warn!("Project lookup for chat {} failed: {}", chat_id, e);
                None
            }
        }
    }

    /// Process and map to an HTTP status plus wire body.
    pub async fn respond(&self, request: ChatRequest, scope: &RequestScope) -> (u16, ChatResponse) {
        match self.handle(request, scope).await {
            Ok(reply) => (200, ChatResponse::Message { message: reply.content }),
            Err(e) => {
                error!("Chat request failed: {}", e);
                (e.status_code(), ChatResponse::Error { error: e.to_string() })
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use crate::usage::{UsageRecord, UsageSink};
    use crate::Result;

    /// Usage sink forwarding records to a channel.
    pub struct ChannelSink(pub mpsc::UnboundedSender<UsageRecord>);

    impl ChannelSink {
        pub fn new() -> (Self, mpsc::UnboundedReceiver<UsageRecord>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (Self(tx), rx)
        }
    }

    #[async_trait]
    impl UsageSink for ChannelSink {
        async fn record(&self, record: &UsageRecord) -> Result<()> {
            let _ = self.0.send(record.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ChannelSink;
    use super::*;
    use crate::attachments::InMemoryFileStore;
    use crate::extraction::{DocxExtractor, MultimodalExtractor, PdfExtractor};
    use crate::projects::{InMemoryProjects, ProjectDocument};
    use crate::tools::testing::FakeSearch;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    struct FailingProjects;

    #[async_trait]
    impl ProjectSource for FailingProjects {
        async fn project_for_chat(&self, _chat_id: &str) -> Result<Option<ProjectContext>> {
            Err(Error::Storage("database offline".into()))
        }
    }

    fn config(base_url: &str) -> Config {
        let mut config = Config::default();
        config.openai.api_key = "sk-test".into();
        config.openai.base_url = base_url.into();
        config.extraction.api_key = "extract-key".into();
        config.extraction.base_url = base_url.into();
        config
    }

    fn service(
        config: Config,
        projects: Option<Arc<dyn ProjectSource>>,
    ) -> (ChatService, tokio::sync::mpsc::UnboundedReceiver<UsageRecord>) {
        let engine = MultimodalExtractor::new(&config.extraction, "extract-key").unwrap();
        let store = InMemoryFileStore::new().with("/api/documents/doc123", "angebot.pdf", b"%PDF-1.4");
        let resolver = AttachmentResolver::new(
            Arc::new(store),
            Arc::new(PdfExtractor::new(engine.clone())),
            Arc::new(DocxExtractor::new(engine)),
            vec!["/uploads/".into(), "/api/documents/".into()],
        );
        let executor = ToolExecutor::new(Arc::new(FakeSearch::with_hits(vec![])));
        let (sink, rx) = ChannelSink::new();
        (
            ChatService::new(config, resolver, executor, projects, Arc::new(sink)),
            rx,
        )
    }

    fn scope() -> RequestScope {
        RequestScope::new("user-1", "tenant-1")
    }

    async fn mount_extraction(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "--- Seite 1 ---\nAngebot Nr. 7\n--- Seite 2 ---\nGesamtpreis 900 EUR"}]}}]
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_openai_pdf_summary_end_to_end() {
        let server = MockServer::start().await;
        mount_extraction(&server).await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(|req: &Request| {
                let body: Value = serde_json::from_slice(&req.body).unwrap();
                let user = body["messages"][1]["content"].as_str().unwrap();
                assert!(user.starts_with("Summarize: [File](/api/documents/doc123)"));
                assert!(user.contains("--- INHALT DATEI 'angebot.pdf' ---"));
                assert!(user.contains("Gesamtpreis 900 EUR"));
                assert!(user.ends_with("--- ENDE DATEI INHALT ---"));
                ResponseTemplate::new(200).set_body_json(json!({
                    "choices": [{"message": {"content": "Ein Angebot über 900 EUR."}, "finish_reason": "stop"}],
                    "usage": {"prompt_tokens": 120, "completion_tokens": 12, "total_tokens": 132}
                }))
            })
            .expect(1)
            .mount(&server)
            .await;

        let (service, mut usage) = service(config(&server.uri()), None);
        let request = ChatRequest::new(
            Provider::OpenAi,
            vec![Message::user("Summarize: [File](/api/documents/doc123)")],
        );

        let reply = service.handle(request, &scope()).await.unwrap();
        assert_eq!(reply.content, "Ein Angebot über 900 EUR.");
        assert_eq!(reply.tokens, 132);
        assert_eq!(reply.outcome, LoopOutcome::Done);

        let record = usage.recv().await.unwrap();
        assert_eq!(record.total_tokens, 132);
        assert_eq!(record.user_id, "user-1");
        assert_eq!(record.tenant_id, "tenant-1");
    }

    #[tokio::test]
    async fn test_failed_extraction_still_completes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(|req: &Request| {
                let body: Value = serde_json::from_slice(&req.body).unwrap();
                let user = body["messages"][1]["content"].as_str().unwrap();
                assert!(user.contains("[SYSTEM FEHLER: Datei 'angebot.pdf' konnte nicht verarbeitet werden:"));
                assert!(!user.contains("--- INHALT DATEI"));
                ResponseTemplate::new(200).set_body_json(json!({
                    "choices": [{"message": {"content": "Die Datei konnte nicht gelesen werden."}, "finish_reason": "stop"}],
                    "usage": {"total_tokens": 40}
                }))
            })
            .expect(1)
            .mount(&server)
            .await;

        let (service, mut usage) = service(config(&server.uri()), None);
        let request = ChatRequest::new(
            Provider::OpenAi,
            vec![Message::user("Summarize: [File](/api/documents/doc123)")],
        );

        let (status, body) = service.respond(request, &scope()).await;
        assert_eq!(status, 200);
        assert!(matches!(body, ChatResponse::Message { ref message } if message == "Die Datei konnte nicht gelesen werden."));
        assert_eq!(usage.recv().await.unwrap().total_tokens, 40);
    }

    #[tokio::test]
    async fn test_project_instruction_and_failed_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(|req: &Request| {
                let body: Value = serde_json::from_slice(&req.body).unwrap();
                let system = body["messages"][0]["content"].as_str().unwrap();
                assert!(system.contains("# Projekt: Relaunch"));
                assert!(system.contains("--- START DOKUMENT 'brief.pdf' ---"));
                ResponseTemplate::new(200).set_body_json(json!({
                    "choices": [{"message": {"content": "ok"}}]
                }))
            })
            .mount(&server)
            .await;

        let mut projects = InMemoryProjects::new();
        projects.insert(
            "chat-1",
            ProjectContext {
                name: "Relaunch".into(),
                goal: None,
                non_goals: None,
                documents: vec![ProjectDocument {
                    filename: "brief.pdf".into(),
                    parsed_content: Some("Briefing".into()),
                }],
            },
        );
        let (service, _usage) = service(config(&server.uri()), Some(Arc::new(projects)));
        let mut request = ChatRequest::new(Provider::OpenAi, vec![Message::user("Hallo")]);
        request.chat_id = Some("chat-1".into());
        assert_eq!(service.handle(request, &scope()).await.unwrap().content, "ok");
    }

    #[tokio::test]
    async fn test_failed_project_lookup_is_ignored() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(|req: &Request| {
                let body: Value = serde_json::from_slice(&req.body).unwrap();
                let system = body["messages"][0]["content"].as_str().unwrap();
                assert!(!system.contains("# Projekt"));
                ResponseTemplate::new(200).set_body_json(json!({
                    "choices": [{"message": {"content": "ok"}}]
                }))
            })
            .expect(1)
            .mount(&server)
            .await;

        let (service, _usage) = service(config(&server.uri()), Some(Arc::new(FailingProjects)));
        let mut request = ChatRequest::new(Provider::OpenAi, vec![Message::user("Hallo")]);
        request.chat_id = Some("chat-1".into());
        assert_eq!(service.handle(request, &scope()).await.unwrap().content, "ok");
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let (svc, _usage) = service(config(&server.uri()), None);

        let (status, body) = svc
            .respond(ChatRequest::new(Provider::OpenAi, vec![]), &scope())
            .await;
        assert_eq!(status, 400);
        assert!(matches!(body, ChatResponse::Error { .. }));

        let (status, _) = svc
            .respond(ChatRequest::new(Provider::OpenAi, vec![Message::user("Hi")]), &scope())
            .await;
        assert_eq!(status, 502);

        // Gemini key is not configured
        let (status, body) = svc
            .respond(ChatRequest::new(Provider::Gemini, vec![Message::user("Hi")]), &scope())
            .await;
        assert_eq!(status, 500);
        match body {
            ChatResponse::Error { error } => assert!(error.contains("Gemini API key")),
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_request_and_response_wire_shape() {
        let request: ChatRequest = serde_json::from_value(json!({
            "messages": [{"role": "user", "content": "Hi"}],
            "provider": "Gemini",
            "mode": "fast",
            "temperature": 0.2,
            "chatId": "c1",
            "systemPrompt": "Pirat"
        }))
        .unwrap();
        assert_eq!(request.provider, Provider::Gemini);
        assert_eq!(request.chat_id.as_deref(), Some("c1"));
        assert_eq!(request.system_prompt.as_deref(), Some("Pirat"));

        let ok = serde_json::to_value(ChatResponse::Message { message: "m".into() }).unwrap();
        assert_eq!(ok, json!({"message": "m"}));
        let err = serde_json::to_value(ChatResponse::Error { error: "e".into() }).unwrap();
        assert_eq!(err, json!({"error": "e"}));
    }
}
