//! One chat turn end to end: load, append the question, run the graph, save.

use std::time::Duration;

use super::checkpoint::CheckpointStore;
use super::errors::AgentError;
use super::graph::AgentGraph;
use super::types::{Message, TokenUsage};

/// Result of a successful turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub session_id: String,
    pub final_text: String,
    /// Cumulative usage of the whole session, this turn included.
    pub usage: TokenUsage,
    pub rounds: usize,
}

/// Run one turn for `session_id`.
///
/// The conversation is only saved when the graph finishes; on any error the
/// stored history is left exactly as it was before the turn.
pub async fn run_chat_turn(
    graph: &AgentGraph,
    store: &dyn CheckpointStore,
    session_id: &str,
    query: &str,
    deadline: Option<Duration>,
) -> Result<TurnReport, AgentError> {
    let mut conversation = store.load(session_id).await?.unwrap_or_default();
    let prior_turns = conversation.len();

    tracing::info!(
        session_id = %session_id,
        prior_turns,
        query_len = query.len(),
        "=== CHAT TURN START ==="
    );

    conversation.push(Message::human(query));

    let outcome = match deadline {
        Some(limit) => tokio::time::timeout(limit, graph.run(session_id, &mut conversation))
            .await
            .map_err(|_| {
                tracing::warn!(session_id = %session_id, secs = limit.as_secs(), "turn deadline exceeded");
                AgentError::TurnTimeout {
                    duration_secs: limit.as_secs(),
                }
            })??,
        None => graph.run(session_id, &mut conversation).await?,
    };

    store.save(session_id, &conversation).await?;

    tracing::info!(
        session_id = %session_id,
        rounds = outcome.rounds,
        tool_calls = outcome.tool_calls,
        turns_added = conversation.len() - prior_turns,
        total_tokens = conversation.usage.total(),
        "=== CHAT TURN COMPLETE ==="
    );

    Ok(TurnReport {
        session_id: session_id.to_string(),
        final_text: outcome.final_text,
        usage: conversation.usage,
        rounds: outcome.rounds,
    })
}
