//! Message types for agent communication

use serde::{Deserialize, Serialize};

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// How a referenced file reaches the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttachmentStrategy {
    /// Bytes sent as base64 media
    InlineMedia,
    /// Converted to text and appended to the message body
    TextExtracted,
}

/// A file resolved from a reference inside a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub source_reference: String,
    pub mime_type: String,
    pub strategy: AttachmentStrategy,
    /// Base64 bytes for inline media, extracted text otherwise
    pub payload: String,
}

impl Attachment {
    pub fn inline(
        source_reference: impl Into<String>,
        mime_type: impl Into<String>,
        base64: String,
    ) -> Self {
        Self {
            source_reference: source_reference.into(),
            mime_type: mime_type.into(),
            strategy: AttachmentStrategy::InlineMedia,
            payload: base64,
        }
    }

    pub fn extracted(
        source_reference: impl Into<String>,
        mime_type: impl Into<String>,
        text: String,
    ) -> Self {
        Self {
            source_reference: source_reference.into(),
            mime_type: mime_type.into(),
            strategy: AttachmentStrategy::TextExtracted,
            payload: text,
        }
    }

    #[inline]
    pub fn is_inline(&self) -> bool {
        self.strategy == AttachmentStrategy::InlineMedia
    }

    #[inline]
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,

    #[serde(default)]
    pub content: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    /// Tool call ID (for tool responses)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Name of the tool a tool response answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// Tool calls made by assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            attachments: Vec::new(),
            tool_call_id: None,
            tool_name: None,
            tool_calls: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content.into())
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content.into())
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content.into())
    }

    /// Create an assistant message with tool calls
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::with_role(Role::Assistant, content.into())
        }
    }

    /// Create a tool result message answering `call`
    pub fn tool_result(call: &ToolCallRequest, result: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: Some(call.name.clone()),
            ..Self::with_role(Role::Tool, result.into())
        }
    }

    /// Copy of this message with new text and attachments.
    pub fn enriched(&self, content: String, attachments: Vec<Attachment>) -> Self {
        Self {
            content,
            attachments,
            ..self.clone()
        }
    }

    /// Tool calls carried by an assistant turn.
    pub fn calls(&self) -> &[ToolCallRequest] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }
}

/// A tool call request from the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Vendor-assigned id; absent for vendors that correlate by name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// A tool call with its result
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: Option<String>,
    pub name: String,
    pub arguments: serde_json::Value,
    pub result: String,
}
