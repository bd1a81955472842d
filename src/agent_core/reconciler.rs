//! Message reconciler.
//!
//! Rebuilds the canonical message sequence from stored turns before every
//! model call. Content is flattened to a string; assistant tool calls and tool
//! result ids are carried through untouched so results stay linked to their
//! calls. Never fails: unrecognized content falls back to its text form and
//! unrecognized roles are skipped.

use serde_json::Value;

use super::types::{Message, Turn};

/// Canonicalize `turns`, preserving order.
///
/// Idempotent: feeding the output back (as turns) yields the same messages.
pub fn reconcile(turns: &[Turn]) -> Vec<Message> {
    turns.iter().filter_map(reconcile_turn).collect()
}

fn reconcile_turn(turn: &Turn) -> Option<Message> {
    let text = flatten_content(&turn.content);
    match turn.role.to_ascii_lowercase().as_str() {
        "human" | "user" => Some(Message::Human { text }),
        "ai" | "assistant" => Some(Message::Assistant {
            text,
            tool_calls: turn.tool_calls.clone(),
        }),
        "tool" => Some(Message::ToolResult {
            text,
            tool_call_id: turn.tool_call_id.clone().unwrap_or_default(),
        }),
        other => {
            tracing::debug!(role = %other, "skipping turn with unrecognized role");
            None
        }
    }
}

/// Reduce any content value to a flat string.
///
/// Lists concatenate their fragments in order; an object fragment contributes
/// its `text` field, or its JSON form when it has none.
pub fn flatten_content(content: &Value) -> String {
    match content {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(flatten_fragment).collect(),
        other => other.to_string(),
    }
}

fn flatten_fragment(item: &Value) -> String {
    match item {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("text") {
            Some(Value::String(s)) => s.clone(),
            Some(text) => text.to_string(),
            None => item.to_string(),
        },
        other => other.to_string(),
    }
}
