//! Agent module — core conversation logic.
//!
//! This module contains:
//! - Message and attachment types
//! - LLM client trait and the OpenAI / Gemini implementations
//! - Agent loop driving tool calls under a turn budget
//! - Context assembler for the system instruction
//!
//! # Adding a New LLM Provider
//!
//! See [`llm::ProviderRegistry`] for instructions.

mod context;
mod loop_impl;
mod message;
pub mod tokens;

// LLM providers in submodule
pub mod llm;

// Re-exports for convenience
pub use context::{ContextAssembler, VerbosityTier, RAG_CHARS_PER_DOCUMENT};
pub use llm::{GeminiClient, LlmClient, LlmResponse, OpenAiClient, Provider, ProviderRegistry, Usage};
pub use loop_impl::{AgentLoop, LoopOutcome, RunResult, BUDGET_EXHAUSTED_NOTICE};
pub use message::{Attachment, AttachmentStrategy, Message, Role, ToolCall, ToolCallRequest};
pub use tokens::{TurnBudget, UsageAccumulator};
