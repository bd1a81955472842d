//! Shared types for the agent core.
//!
//! `Turn` is the tolerant stored shape of one conversation entry; `Message` is
//! the canonical shape the loop works with. The reconciler maps one to the
//! other on every pass.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::inference::types::{ToolCall, UsageMetadata};

// ─── Roles ──────────────────────────────────────────────────────────────────

/// Role tag written for human turns.
pub const ROLE_HUMAN: &str = "human";
/// Role tag written for assistant turns.
pub const ROLE_ASSISTANT: &str = "ai";
/// Role tag written for tool-result turns.
pub const ROLE_TOOL: &str = "tool";

// ─── Canonical Messages ─────────────────────────────────────────────────────

/// A canonical conversation message. Content is always a flat string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    Human {
        text: String,
    },
    Assistant {
        text: String,
        /// In the order the model listed them.
        tool_calls: Vec<ToolCall>,
    },
    ToolResult {
        text: String,
        tool_call_id: String,
    },
}

impl Message {
    pub fn human(text: impl Into<String>) -> Self {
        Message::Human { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message::Assistant {
            text: text.into(),
            tool_calls,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Message::ToolResult {
            text: text.into(),
            tool_call_id: tool_call_id.into(),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Message::Human { text } | Message::Assistant { text, .. } | Message::ToolResult { text, .. } => text,
        }
    }

    /// Tool calls carried by an assistant message; empty for other variants.
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

// ─── Stored Turns ───────────────────────────────────────────────────────────

/// One conversation entry as stored or as produced by the model provider.
///
/// `content` may be a string, a list of typed fragments, or absent. The role
/// is accepted under `role` or `type`, in either vocabulary
/// (`human`/`user`, `ai`/`assistant`, `tool`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    #[serde(alias = "type")]
    pub role: String,
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl From<Message> for Turn {
    fn from(message: Message) -> Self {
        match message {
            Message::Human { text } => Turn {
                role: ROLE_HUMAN.to_string(),
                content: Value::String(text),
                tool_calls: Vec::new(),
                tool_call_id: None,
            },
            Message::Assistant { text, tool_calls } => Turn {
                role: ROLE_ASSISTANT.to_string(),
                content: Value::String(text),
                tool_calls,
                tool_call_id: None,
            },
            Message::ToolResult { text, tool_call_id } => Turn {
                role: ROLE_TOOL.to_string(),
                content: Value::String(text),
                tool_calls: Vec::new(),
                tool_call_id: Some(tool_call_id),
            },
        }
    }
}

// ─── Usage ──────────────────────────────────────────────────────────────────

/// Cumulative token counters. Only ever grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }

    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

impl From<UsageMetadata> for TokenUsage {
    fn from(usage: UsageMetadata) -> Self {
        Self::new(usage.prompt_tokens, usage.completion_tokens)
    }
}

// ─── Conversation ───────────────────────────────────────────────────────────

/// Ordered turns of one session plus its cumulative token usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub turns: Vec<Turn>,
    #[serde(default)]
    pub usage: TokenUsage,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: impl Into<Turn>) {
        self.turns.push(turn.into());
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Canonical view of the whole history.
    pub fn messages(&self) -> Vec<Message> {
        super::reconciler::reconcile(&self.turns)
    }

    /// Canonical view of the last turn, if it has a recognized role.
    pub fn last_message(&self) -> Option<Message> {
        super::reconciler::reconcile(self.turns.last().map(std::slice::from_ref).unwrap_or(&[]))
            .pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_usage_accumulates() {
        let mut usage = TokenUsage::default();
        for (input, output) in [(10, 5), (8, 4), (6, 3)] {
            usage.add(TokenUsage::new(input, output));
        }
        assert_eq!(usage, TokenUsage::new(24, 12));
        assert_eq!(usage.total(), 36);
    }

    #[test]
    fn test_turn_accepts_type_alias_and_missing_content() {
        let turn: Turn = serde_json::from_value(json!({"type": "ai"})).unwrap();
        assert_eq!(turn.role, "ai");
        assert!(turn.content.is_null());
        assert!(turn.tool_calls.is_empty());
    }

    #[test]
    fn test_message_into_turn() {
        let turn = Turn::from(Message::tool_result("call_9", "3 rows"));
        assert_eq!(turn.role, ROLE_TOOL);
        assert_eq!(turn.content, json!("3 rows"));
        assert_eq!(turn.tool_call_id.as_deref(), Some("call_9"));
    }

    #[test]
    fn test_last_message_reconciled() {
        let mut conversation = Conversation::new();
        assert!(conversation.last_message().is_none());
        conversation.push(Turn {
            role: "assistant".to_string(),
            content: json!([{"type": "text", "text": "done"}]),
            tool_calls: vec![],
            tool_call_id: None,
        });
        assert_eq!(conversation.last_message(), Some(Message::assistant("done", vec![])));
    }
}
