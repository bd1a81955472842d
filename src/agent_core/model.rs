//! Reasoning component seam.
//!
//! The graph only sees `ChatModel`. `InferenceClient` implements it over the
//! OpenAI-compatible endpoint; tests plug in scripted models.

use async_trait::async_trait;

use super::types::{Message, TokenUsage, Turn, ROLE_ASSISTANT};
use crate::inference::types::{ChatMessage, FunctionCallResponse, Role, ToolCallResponse, ToolDefinition};
use crate::inference::{InferenceClient, InferenceError};

/// One model response: a raw assistant turn plus optional usage.
#[derive(Debug, Clone)]
pub struct ModelReply {
    /// Always an assistant turn. Content is left as the provider sent it.
    pub turn: Turn,
    pub usage: Option<TokenUsage>,
}

/// Anything that can answer one agent step.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn invoke(
        &self,
        system_instruction: &str,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ModelReply, InferenceError>;
}

#[async_trait]
impl ChatModel for InferenceClient {
    async fn invoke(
        &self,
        system_instruction: &str,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ModelReply, InferenceError> {
        let chat_messages = build_chat_messages(system_instruction, messages);
        let tools = (!tools.is_empty()).then(|| tools.to_vec());

        let response = self.chat_completion(chat_messages, tools).await?;

        tracing::info!(
            tool_calls_count = response.tool_calls.len(),
            finish_reason = response.finish_reason.as_deref().unwrap_or("none"),
            has_usage = response.usage.is_some(),
            "=== LLM RESPONSE ==="
        );

        Ok(ModelReply {
            turn: Turn {
                role: ROLE_ASSISTANT.to_string(),
                content: response.content,
                tool_calls: response.tool_calls,
                tool_call_id: None,
            },
            usage: response.usage.map(TokenUsage::from),
        })
    }
}

/// Convert canonical messages to the wire format, system instruction first.
pub fn build_chat_messages(system_instruction: &str, messages: &[Message]) -> Vec<ChatMessage> {
    let mut chat_messages = Vec::with_capacity(messages.len() + 1);
    chat_messages.push(ChatMessage {
        role: Role::System,
        content: Some(system_instruction.to_string()),
        tool_call_id: None,
        tool_calls: None,
    });

    for msg in messages {
        let chat_message = match msg {
            Message::Human { text } => ChatMessage {
                role: Role::User,
                content: Some(text.clone()),
                tool_call_id: None,
                tool_calls: None,
            },
            Message::Assistant { text, tool_calls } => {
                let tool_calls = (!tool_calls.is_empty()).then(|| {
                    tool_calls
                        .iter()
                        .map(|tc| ToolCallResponse {
                            id: tc.id.clone(),
                            r#type: "function".to_string(),
                            function: FunctionCallResponse {
                                name: tc.name.clone(),
                                arguments: match &tc.arguments {
                                    serde_json::Value::String(raw) => raw.clone(),
                                    args => args.to_string(),
                                },
                            },
                        })
                        .collect()
                });
                ChatMessage {
                    role: Role::Assistant,
                    content: Some(text.clone()).filter(|t| !t.is_empty()),
                    tool_call_id: None,
                    tool_calls,
                }
            }
            Message::ToolResult { text, tool_call_id } => ChatMessage {
                role: Role::Tool,
                content: Some(text.clone()),
                tool_call_id: Some(tool_call_id.clone()),
                tool_calls: None,
            },
        };
        chat_messages.push(chat_message);
    }

    chat_messages
}
