//! Agent loop - bounded tool-calling loop shared by all providers
//!
//! `AWAITING_MODEL -> EXECUTING_TOOLS -> AWAITING_MODEL -> ... -> DONE`,
//! ending early on a refusal or when the turn budget runs out.

use tracing::{debug, info, warn};

use crate::tools::{InvocationError, ToolExecutor, ToolInvocation};
use crate::Result;

use super::llm::LlmClient;
use super::message::{Message, ToolCall};
use super::tokens::{TurnBudget, UsageAccumulator};

/// Returned when the budget runs out before the model produced any text.
pub const BUDGET_EXHAUSTED_NOTICE: &str = "Die Anfrage konnte nicht innerhalb der erlaubten Anzahl an Werkzeugaufrufen abgeschlossen werden. Bitte stelle die Frage genauer.";

/// How a run ended. Provider errors are returned as `Err` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The model answered without requesting a tool.
    Done,
    /// Ceiling reached with a tool call still outstanding.
    BudgetExhausted,
    /// The vendor refused, or asked for a tool that does not exist.
    Blocked,
}

/// Result of one run: final text plus accounting.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub content: String,
    pub tokens: usize,
    pub outcome: LoopOutcome,
    /// Completion round-trips issued
    pub iterations: usize,
    /// Tool calls executed, in order
    pub tool_calls: Vec<ToolCall>,
}

/// The agent loop drives one provider client and the tool executor.
pub struct AgentLoop<C: LlmClient> {
    client: C,
    executor: ToolExecutor,
    max_iterations: usize,
}

impl<C: LlmClient> AgentLoop<C> {
    /// Create a new agent loop
    pub fn new(client: C, executor: ToolExecutor, max_iterations: usize) -> Self {
        Self {
            client,
            executor,
            max_iterations,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Run the loop over an already enriched conversation.
    pub async fn run(&self, mut messages: Vec<Message>, instruction: &str) -> Result<RunResult> {
        let tools = self.executor.definitions();
        let mut budget = TurnBudget::new(self.max_iterations);
        let mut usage = UsageAccumulator::new();
        let mut last_text: Option<String> = None;
        let mut executed: Vec<ToolCall> = Vec::new();

        info!(
            model = self.client.model(),
            messages = messages.len(),
            "Starting agent loop"
        );

        while budget.try_begin() {
            debug!("Iteration {}/{}", budget.used(), budget.ceiling());

            let response = self.client.chat(&messages, instruction, &tools).await?;
            usage.add(&response.usage);

            if let Some(text) = response.content.as_deref().filter(|t| !t.trim().is_empty()) {
                last_text = Some(text.to_string());
            }

            let finish = |content: String, outcome: LoopOutcome, executed: Vec<ToolCall>| RunResult {
                content,
                tokens: usage.total(),
                outcome,
                iterations: budget.used(),
                tool_calls: executed,
            };

            if let Some(notice) = &response.blocked {
                warn!("Model refused ({}), returning notice", response.finish_reason);
                return Ok(finish(notice.clone(), LoopOutcome::Blocked, executed));
            }

            if !response.has_tool_calls() {
                let content = response
                    .content
                    .or(last_text)
                    .unwrap_or_default();
                info!(
                    rounds = usage.rounds(),
                    tokens = usage.total(),
                    "Agent completed with response: {} chars",
                    content.len()
                );
                return Ok(finish(content, LoopOutcome::Done, executed));
            }

            if budget.is_exhausted() {
                warn!(
                    "Turn budget of {} exhausted with {} tool call(s) outstanding",
                    budget.ceiling(),
                    response.tool_calls.len()
                );
                let content = last_text.unwrap_or_else(|| BUDGET_EXHAUSTED_NOTICE.to_string());
                return Ok(finish(content, LoopOutcome::BudgetExhausted, executed));
            }

            let invocations: Vec<_> = response.tool_calls.iter().map(ToolInvocation::parse).collect();
            if let Some(Err(InvocationError::UnknownTool(name))) = invocations
                .iter()
                .find(|r| matches!(r, Err(InvocationError::UnknownTool(_))))
            {
                warn!("Model requested unknown tool {:?}", name);
                return Ok(finish(unknown_tool_notice(name), LoopOutcome::Blocked, executed));
            }

            messages.push(Message::assistant_with_tools(
                response.content.clone().unwrap_or_default(),
                response.tool_calls.clone(),
            ));

            // Every call gets exactly one result before the next round-trip.
            for (call, invocation) in response.tool_calls.iter().zip(invocations) {
                let result = match invocation {
                    Ok(invocation) => {
                        debug!("Running tool {}", invocation.name());
                        self.executor.execute(&invocation).await
                    }
                    Err(e) => {
                        debug!("Rejected tool call {}: {}", call.name, e);
                        format!("Error: {}", e)
                    }
                };
                messages.push(Message::tool_result(call, result.clone()));
                executed.push(ToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                    result,
                });
            }
        }

        warn!("Agent loop started with an empty turn budget");
        Ok(RunResult {
            content: last_text.unwrap_or_else(|| BUDGET_EXHAUSTED_NOTICE.to_string()),
            tokens: usage.total(),
            outcome: LoopOutcome::BudgetExhausted,
            iterations: budget.used(),
            tool_calls: executed,
        })
    }
}

fn unknown_tool_notice(name: &str) -> String {
    format!(
        "Das Modell wollte das unbekannte Werkzeug '{}' verwenden. Die Anfrage wurde ohne dieses Werkzeug beendet; bitte formuliere sie neu.",
        name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::{FakeLlmClient, LlmResponse, Usage};
    use crate::agent::Role;
    use crate::error::Error;
    use crate::tools::testing::FakeSearch;
    use crate::tools::SearchHit;
    use serde_json::json;
    use std::sync::Arc;

    fn executor() -> ToolExecutor {
        ToolExecutor::new(Arc::new(FakeSearch::with_hits(vec![SearchHit {
            title: "Result".into(),
            url: "https://example.com".into(),
            snippet: "snippet".into(),
        }])))
    }

    fn search_call(id: &str, query: &str) -> LlmResponse {
        FakeLlmClient::tool_call_response(Some(id), "search_web", json!({"query": query}))
    }

    #[tokio::test]
    async fn test_agent_loop_simple() {
        let client = FakeLlmClient::scripted(vec![LlmResponse::text("Hello, human!").with_usage(Usage::total(12))]);
        let agent = AgentLoop::new(client, executor(), 3);

        let result = agent.run(vec![Message::user("Hi there")], "Be nice").await.unwrap();

        assert_eq!(result.content, "Hello, human!");
        assert_eq!(result.tokens, 12);
        assert_eq!(result.outcome, LoopOutcome::Done);
        assert_eq!(result.iterations, 1);
    }

    #[tokio::test]
    async fn test_agent_loop_with_tool() {
        let client = FakeLlmClient::with_tool_call(
            "search_web",
            json!({"query": "rust"}),
            "Rust is a language",
        );
        let agent = AgentLoop::new(client, executor(), 3);

        let result = agent.run(vec![Message::user("What is rust?")], "").await.unwrap();

        assert_eq!(result.content, "Rust is a language");
        assert_eq!(result.tool_calls.len(), 1);
        assert!(result.tool_calls[0].result.contains("https://example.com"));

        // Second round-trip saw the assistant call and its matching result.
        let seen = agent.client().seen.lock().unwrap();
        let second = &seen[1];
        assert_eq!(second.len(), 3);
        assert_eq!(second[1].role, Role::Assistant);
        assert_eq!(second[2].role, Role::Tool);
        assert_eq!(second[2].tool_call_id.as_deref(), Some("tc_1"));
    }

    #[tokio::test]
    async fn test_every_call_answered_before_next_round() {
        let mut first = search_call("call_a", "one");
        first.tool_calls.push(search_call("call_b", "two").tool_calls.remove(0));
        let client = FakeLlmClient::scripted(vec![first, LlmResponse::text("done")]);
        let agent = AgentLoop::new(client, executor(), 3);

        agent.run(vec![Message::user("two searches")], "").await.unwrap();

        let seen = agent.client().seen.lock().unwrap();
        let ids: Vec<_> = seen[1]
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.tool_call_id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["call_a", "call_b"]);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_degrades_to_last_text() {
        let mut second = search_call("c2", "two");
        second.content = Some("Zwischenstand".into());
        let client = FakeLlmClient::scripted(vec![
            search_call("c1", "one").with_usage(Usage::total(5)),
            second.with_usage(Usage::total(7)),
            search_call("c3", "three").with_usage(Usage::total(9)),
            LlmResponse::text("never reached"),
        ]);
        let agent = AgentLoop::new(client, executor(), 3);

        let result = agent.run(vec![Message::user("loop forever")], "").await.unwrap();

        assert_eq!(result.outcome, LoopOutcome::BudgetExhausted);
        assert_eq!(result.content, "Zwischenstand");
        assert_eq!(result.tokens, 21);
        assert_eq!(result.iterations, 3);
        assert_eq!(agent.client().calls(), 3);
    }

    #[tokio::test]
    async fn test_configured_ceiling_cannot_exceed_three() {
        let client = FakeLlmClient::scripted(vec![
            search_call("c1", "a"),
            search_call("c2", "b"),
            search_call("c3", "c"),
            search_call("c4", "d"),
            LlmResponse::text("never reached"),
        ]);
        let agent = AgentLoop::new(client, executor(), 10);

        let result = agent.run(vec![Message::user("q")], "").await.unwrap();
        assert_eq!(result.outcome, LoopOutcome::BudgetExhausted);
        assert_eq!(result.iterations, 3);
        assert_eq!(agent.client().calls(), 3);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_without_text_uses_notice() {
        let client = FakeLlmClient::scripted(vec![
            search_call("c1", "a"),
            search_call("c2", "b"),
            search_call("c3", "c"),
        ]);
        let agent = AgentLoop::new(client, executor(), 3);

        let result = agent.run(vec![Message::user("q")], "").await.unwrap();
        assert_eq!(result.content, BUDGET_EXHAUSTED_NOTICE);
    }

    #[tokio::test]
    async fn test_blocked_response_short_circuits() {
        let client = FakeLlmClient::scripted(vec![
            LlmResponse::blocked("blockiert", "SAFETY", Usage::total(3)),
            LlmResponse::text("never reached"),
        ]);
        let agent = AgentLoop::new(client, executor(), 3);

        let result = agent.run(vec![Message::user("bad")], "").await.unwrap();
        assert_eq!(result.outcome, LoopOutcome::Blocked);
        assert_eq!(result.content, "blockiert");
        assert_eq!(result.tokens, 3);
        assert_eq!(agent.client().calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_non_fatal() {
        let client = FakeLlmClient::scripted(vec![FakeLlmClient::tool_call_response(
            None,
            "run_shell",
            json!({"cmd": "ls"}),
        )]);
        let agent = AgentLoop::new(client, executor(), 3);

        let result = agent.run(vec![Message::user("q")], "").await.unwrap();
        assert_eq!(result.outcome, LoopOutcome::Blocked);
        assert!(result.content.contains("run_shell"));
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_answered() {
        let client = FakeLlmClient::scripted(vec![
            FakeLlmClient::tool_call_response(Some("c1"), "search_web", json!({})),
            LlmResponse::text("ok"),
        ]);
        let agent = AgentLoop::new(client, executor(), 3);

        let result = agent.run(vec![Message::user("q")], "").await.unwrap();
        assert_eq!(result.content, "ok");
        assert!(result.tool_calls[0].result.starts_with("Error:"));
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let client = FakeLlmClient::scripted(vec![]);
        let agent = AgentLoop::new(client, executor(), 3);

        let err = agent.run(vec![Message::user("q")], "").await.unwrap_err();
        assert!(matches!(err, Error::Llm { .. }));
    }
}
