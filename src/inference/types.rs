//! Shared types for the inference client.
//!
//! These mirror the OpenAI Chat Completions API types, used for both
//! request building and response parsing.

use serde::{Deserialize, Serialize};

// ─── Request Types ───────────────────────────────────────────────────────────

/// A single message in the request body.
///
/// Serialization notes for OpenAI-compatible servers:
/// - `content` is sent as `""` (not `null`) for assistant messages that only
///   carry tool calls. Several self-hosted runtimes reject `null` content.
/// - `tool_call_id` and `tool_calls` are skipped when `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(serialize_with = "serialize_content")]
    pub content: Option<String>,
    /// Tool call results are sent back as `tool` role messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Assistant messages may contain tool calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallResponse>>,
}

/// Emit `""` instead of `null` when `content` is `None`.
fn serialize_content<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(s) => serializer.serialize_str(s),
        None => serializer.serialize_str(""),
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Tool definition sent in the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub r#type: String,
    pub function: FunctionDefinition,
}

impl ToolDefinition {
    /// Build a `"function"` tool definition.
    pub fn function(name: &str, description: &str, parameters: serde_json::Value) -> Self {
        Self {
            r#type: "function".to_string(),
            function: FunctionDefinition {
                name: name.to_string(),
                description: description.to_string(),
                parameters,
            },
        }
    }
}

/// Function definition within a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Request body for `POST /v1/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

// ─── Response Types ──────────────────────────────────────────────────────────

/// A parsed tool call extracted from the model's response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this tool call (generated if the model doesn't provide one).
    #[serde(default)]
    pub id: String,
    /// Tool name, e.g. `"list_all_tables"`.
    #[serde(default)]
    pub name: String,
    /// JSON arguments. A string value means the model sent unparseable JSON.
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Tool call as carried in the OpenAI message format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResponse {
    pub id: String,
    pub r#type: String,
    pub function: FunctionCallResponse,
}

/// Function call details in a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallResponse {
    pub name: String,
    pub arguments: String,
}

/// Token accounting reported by the endpoint, when present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

/// A complete (non-streaming) chat completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Raw `content` value. Usually a string, but some providers return a
    /// list of typed parts.
    pub content: serde_json::Value,
    /// Tool calls in the order the model listed them.
    pub tool_calls: Vec<ToolCall>,
    /// Token usage, if the endpoint reported it.
    pub usage: Option<UsageMetadata>,
    /// `"stop"`, `"tool_calls"`, `"length"`, ...
    pub finish_reason: Option<String>,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_content_serializes_as_empty_string() {
        let msg = ChatMessage {
            role: Role::Assistant,
            content: None,
            tool_call_id: None,
            tool_calls: Some(vec![ToolCallResponse {
                id: "call_1".to_string(),
                r#type: "function".to_string(),
                function: FunctionCallResponse {
                    name: "list_all_tables".to_string(),
                    arguments: "{}".to_string(),
                },
            }]),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""content":"""#));
        assert!(!json.contains("tool_call_id"));
    }

    #[test]
    fn test_tool_choice_omitted_without_tools() {
        let req = ChatCompletionRequest {
            model: "test".to_string(),
            messages: vec![],
            tools: None,
            tool_choice: None,
            temperature: 0.0,
            max_tokens: 1024,
            stream: false,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("tool_choice"));
        assert!(!json.contains("tools"));
    }

    #[test]
    fn test_tool_call_defaults_missing_fields() {
        let tc: ToolCall = serde_json::from_str(r#"{"name":"run_sql_query"}"#).unwrap();
        assert_eq!(tc.id, "");
        assert!(tc.arguments.is_null());
    }
}
