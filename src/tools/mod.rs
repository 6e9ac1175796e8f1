//! Tools module - capabilities the model may invoke
//!
//! The tool set is closed: every callable tool is a variant of
//! [`ToolInvocation`], validated from the raw vendor call at the boundary.
//! Adding a tool means adding a variant, a definition and an executor arm.

mod runner;
mod web;

pub use runner::ToolExecutor;
#[cfg(test)]
pub(crate) use runner::testing;
pub use web::{format_digest, BraveSearch, SearchHit, WebSearch};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::agent::ToolCallRequest;

/// Name the web search tool is declared under.
pub const SEARCH_WEB: &str = "search_web";

/// Tool definition for LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    /// Declaration of the `search_web` tool.
    pub fn search_web() -> Self {
        Self {
            name: SEARCH_WEB.to_string(),
            description: "Search the web for current information. Returns titles, snippets and URLs of the best matches.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query"
                    }
                },
                "required": ["query"]
            }),
        }
    }
}

/// A validated tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    SearchWeb { query: String },
}

/// Why a raw tool call could not be validated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
}

#[derive(Deserialize)]
struct SearchWebArgs {
    query: String,
}

impl ToolInvocation {
    /// Validate a vendor tool call against the closed tool set.
    ///
    /// OpenAI sends arguments as a JSON-encoded string, Gemini as an object;
    /// both shapes are accepted.
    pub fn parse(call: &ToolCallRequest) -> Result<Self, InvocationError> {
        match call.name.as_str() {
            SEARCH_WEB => {
                let args: SearchWebArgs = decode_arguments(&call.arguments).map_err(|reason| {
                    InvocationError::InvalidArguments {
                        tool: call.name.clone(),
                        reason,
                    }
                })?;
                let query = args.query.trim();
                if query.is_empty() {
                    return Err(InvocationError::InvalidArguments {
                        tool: call.name.clone(),
                        reason: "query is empty".to_string(),
                    });
                }
                Ok(ToolInvocation::SearchWeb {
                    query: query.to_string(),
                })
            }
            other => Err(InvocationError::UnknownTool(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolInvocation::SearchWeb { .. } => SEARCH_WEB,
        }
    }
}

fn decode_arguments<T: serde::de::DeserializeOwned>(raw: &Value) -> Result<T, String> {
    let value = match raw {
        Value::String(encoded) => serde_json::from_str(encoded).map_err(|e| e.to_string())?,
        other => other.clone(),
    };
    serde_json::from_value(value).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, arguments: Value) -> ToolCallRequest {
        ToolCallRequest {
            id: Some("call_1".into()),
            name: name.into(),
            arguments,
        }
    }

    #[test]
    fn test_parse_object_arguments() {
        let inv = ToolInvocation::parse(&call("search_web", json!({"query": "rust async"}))).unwrap();
        assert_eq!(inv, ToolInvocation::SearchWeb { query: "rust async".into() });
        assert_eq!(inv.name(), "search_web");
    }

    #[test]
    fn test_parse_string_encoded_arguments() {
        let inv = ToolInvocation::parse(&call("search_web", json!("{\"query\":\"wetter berlin\"}"))).unwrap();
        assert_eq!(inv, ToolInvocation::SearchWeb { query: "wetter berlin".into() });
    }

    #[test]
    fn test_parse_unknown_tool() {
        let err = ToolInvocation::parse(&call("delete_everything", json!({}))).unwrap_err();
        assert_eq!(err, InvocationError::UnknownTool("delete_everything".into()));
    }

    #[test]
    fn test_parse_missing_query() {
        let err = ToolInvocation::parse(&call("search_web", json!({"q": "x"}))).unwrap_err();
        assert!(matches!(err, InvocationError::InvalidArguments { .. }));

        let err = ToolInvocation::parse(&call("search_web", json!({"query": "   "}))).unwrap_err();
        assert!(matches!(err, InvocationError::InvalidArguments { .. }));
    }

    #[test]
    fn test_search_web_definition() {
        let def = ToolDefinition::search_web();
        assert_eq!(def.name, "search_web");
        assert_eq!(def.parameters["required"][0], "query");
    }
}
