//! Non-streaming chat completion response parsing.

use std::collections::HashSet;

use serde::Deserialize;
use uuid::Uuid;

use super::errors::InferenceError;
use super::types::{CompletionResponse, ToolCall, UsageMetadata};

/// Parse a non-streaming chat completion response body.
///
/// Tool calls without an `id`, or repeating an earlier call's `id`, get a
/// generated `call_<uuid>` so results pair up one-to-one. Arguments may
/// arrive as a JSON-encoded string or as an inline object; an argument string
/// that is not valid JSON is kept verbatim so the tool layer can report it back
/// to the model instead of failing the whole turn.
pub fn parse_completion_response(body: &str) -> Result<CompletionResponse, InferenceError> {
    #[derive(Deserialize)]
    struct ApiResponse {
        choices: Vec<ApiChoice>,
        #[serde(default)]
        usage: Option<UsageMetadata>,
    }

    #[derive(Deserialize)]
    struct ApiChoice {
        message: ApiMessage,
        finish_reason: Option<String>,
    }

    #[derive(Deserialize)]
    struct ApiMessage {
        #[serde(default)]
        content: serde_json::Value,
        #[serde(default)]
        tool_calls: Option<Vec<ApiToolCall>>,
    }

    #[derive(Deserialize)]
    struct ApiToolCall {
        id: Option<String>,
        function: ApiFunction,
    }

    #[derive(Deserialize)]
    struct ApiFunction {
        name: String,
        #[serde(default)]
        arguments: serde_json::Value,
    }

    let resp: ApiResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::MalformedResponse {
            reason: format!("failed to parse completion response: {e}"),
        })?;

    let ApiChoice {
        message,
        finish_reason,
    } = resp
        .choices
        .into_iter()
        .next()
        .ok_or(InferenceError::MalformedResponse {
            reason: "empty choices array".into(),
        })?;

    let mut seen_ids: HashSet<String> = HashSet::new();
    let tool_calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let id = match tc.id.filter(|id| !id.is_empty()) {
                Some(id) if seen_ids.insert(id.clone()) => id,
                Some(dup) => {
                    tracing::warn!(tool_call_id = %dup, tool = %tc.function.name, "duplicate tool call id, reassigning");
                    fresh_call_id(&mut seen_ids)
                }
                None => fresh_call_id(&mut seen_ids),
            };
            ToolCall {
                id,
                name: tc.function.name,
                arguments: decode_arguments(tc.function.arguments),
            }
        })
        .collect();

    Ok(CompletionResponse {
        content: message.content,
        tool_calls,
        usage: resp.usage,
        finish_reason,
    })
}

fn fresh_call_id(seen: &mut HashSet<String>) -> String {
    let id = format!("call_{}", Uuid::new_v4());
    seen.insert(id.clone());
    id
}

fn decode_arguments(raw: serde_json::Value) -> serde_json::Value {
    match raw {
        serde_json::Value::String(s) if s.trim().is_empty() => serde_json::json!({}),
        serde_json::Value::String(s) => match serde_json::from_str(&s) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, raw = %s, "tool call arguments are not valid JSON");
                serde_json::Value::String(s)
            }
        },
        serde_json::Value::Null => serde_json::json!({}),
        other => other,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_response_with_usage() {
        let body = r#"{
            "choices": [{
                "message": {"role": "assistant", "content": "There are 42 customers."},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 120, "completion_tokens": 9, "total_tokens": 129}
        }"#;

        let resp = parse_completion_response(body).unwrap();
        assert_eq!(resp.content, "There are 42 customers.");
        assert!(resp.tool_calls.is_empty());
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
        assert_eq!(
            resp.usage,
            Some(UsageMetadata {
                prompt_tokens: 120,
                completion_tokens: 9
            })
        );
    }

    #[test]
    fn test_parse_tool_calls_preserves_order() {
        let body = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "call_a", "type": "function",
                         "function": {"name": "search_tables_by_keyword", "arguments": "{\"keyword\": \"order\"}"}},
                        {"type": "function",
                         "function": {"name": "list_all_tables", "arguments": ""}}
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        }"#;

        let resp = parse_completion_response(body).unwrap();
        assert!(resp.content.is_null());
        assert!(resp.usage.is_none());
        assert_eq!(resp.tool_calls.len(), 2);
        assert_eq!(resp.tool_calls[0].id, "call_a");
        assert_eq!(resp.tool_calls[0].arguments["keyword"], "order");
        assert_eq!(resp.tool_calls[1].name, "list_all_tables");
        assert!(resp.tool_calls[1].id.starts_with("call_"));
        assert_eq!(resp.tool_calls[1].arguments, serde_json::json!({}));
    }

    #[test]
    fn test_repeated_tool_call_id_reassigned() {
        let body = r#"{
            "choices": [{
                "message": {"tool_calls": [
                    {"id": "call_x", "function": {"name": "get_table_details", "arguments": "{\"table_names\": [\"orders\"]}"}},
                    {"id": "call_x", "function": {"name": "get_table_details", "arguments": "{\"table_names\": [\"customers\"]}"}},
                    {"id": "call_y", "function": {"name": "list_all_tables", "arguments": "{}"}}
                ]},
                "finish_reason": "tool_calls"
            }]
        }"#;

        let resp = parse_completion_response(body).unwrap();
        let ids: Vec<&str> = resp.tool_calls.iter().map(|tc| tc.id.as_str()).collect();
        assert_eq!(ids[0], "call_x");
        assert_ne!(ids[1], "call_x");
        assert!(ids[1].starts_with("call_"));
        assert_eq!(ids[2], "call_y");
        assert_eq!(resp.tool_calls[1].arguments["table_names"][0], "customers");

        let unique: HashSet<&str> = ids.iter().copied().collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn test_parse_list_content_kept_raw() {
        let body = r#"{
            "choices": [{
                "message": {"content": [{"type": "text", "text": "part one"}]},
                "finish_reason": "stop"
            }]
        }"#;
        let resp = parse_completion_response(body).unwrap();
        assert!(resp.content.is_array());
    }

    #[test]
    fn test_invalid_argument_json_kept_as_string() {
        let body = r#"{
            "choices": [{
                "message": {"tool_calls": [
                    {"id": "c1", "function": {"name": "run_sql_query", "arguments": "{sql: oops"}}
                ]},
                "finish_reason": "tool_calls"
            }]
        }"#;
        let resp = parse_completion_response(body).unwrap();
        assert_eq!(resp.tool_calls[0].arguments, "{sql: oops");
    }

    #[test]
    fn test_empty_choices_is_error() {
        let err = parse_completion_response(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, InferenceError::MalformedResponse { .. }));
    }

    #[test]
    fn test_garbage_body_is_error() {
        assert!(parse_completion_response("<html>502</html>").is_err());
    }
}
