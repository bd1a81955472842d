//! Orchestration state machine: the Agent ⇄ Tools loop.
//!
//! ```text
//! Start ──► Agent ──(tool calls)──► Tools ──► Agent ...
//!             │
//!             └──(no tool calls)──► Terminal
//! ```
//!
//! Each Agent step reconciles the full history, calls the model once and
//! appends exactly one assistant turn. Each Tools step runs every call of that
//! turn concurrently and appends one result per call, in call order. Only a
//! model failure, the round budget, or the caller's deadline end a turn early.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use super::errors::AgentError;
use super::model::ChatModel;
use super::types::{Conversation, Message};
use crate::inference::types::{ToolCall, ToolDefinition};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Maximum agent rounds per turn.
pub const DEFAULT_MAX_ROUNDS: usize = 10;

/// Prepended to every model call; never stored in the conversation.
pub const SYSTEM_INSTRUCTION: &str = "\
You are a careful data analyst answering questions about a relational database \
by writing SQL.

Discover the schema progressively before querying:
1. Call list_all_tables to see which tables exist, or search_tables_by_keyword \
to find tables and columns related to the question.
2. Call get_table_details for the tables you intend to use, so you know their \
exact column names and types.
3. Only then call run_sql_query with a single read-only SELECT statement.

Never guess table or column names. If a query fails, read the error, correct \
the statement and try again. Write statements are rejected. When you have the \
data, answer the question directly and concisely.";

// ─── Seams ───────────────────────────────────────────────────────────────────

/// Executes the model's tool calls. Always returns text, never an error.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn definitions(&self) -> Vec<ToolDefinition>;

    async fn execute(&self, call: &ToolCall) -> String;
}

/// Observes the final history of a turn without changing it.
pub trait TranscriptSink: Send + Sync {
    fn observe(&self, session_id: &str, messages: &[Message]);
}

/// Writes the transcript to the log at `debug` level.
pub struct TracingTranscript;

impl TranscriptSink for TracingTranscript {
    fn observe(&self, session_id: &str, messages: &[Message]) {
        for (index, message) in messages.iter().enumerate() {
            let (kind, id) = match message {
                Message::Human { .. } => ("human", ""),
                Message::Assistant { .. } => ("assistant", ""),
                Message::ToolResult { tool_call_id, .. } => ("tool", tool_call_id.as_str()),
            };
            tracing::debug!(
                session_id = %session_id,
                index,
                kind,
                tool_call_id = %id,
                tool_calls_count = message.tool_calls().len(),
                text = %message.text(),
                "transcript"
            );
        }
    }
}

// ─── State Machine ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Start,
    Agent,
    Tools,
    Terminal,
}

/// Transition out of Agent, decided by the message it just produced.
pub fn route(last: &Message) -> GraphState {
    if last.tool_calls().is_empty() {
        GraphState::Terminal
    } else {
        GraphState::Tools
    }
}

/// Summary of a completed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Text of the final assistant message.
    pub final_text: String,
    /// Agent steps taken.
    pub rounds: usize,
    /// Tool calls executed across all rounds.
    pub tool_calls: usize,
}

pub struct AgentGraph {
    model: Arc<dyn ChatModel>,
    tools: Arc<dyn ToolExecutor>,
    max_rounds: usize,
    sink: Option<Arc<dyn TranscriptSink>>,
}

impl AgentGraph {
    pub fn new(model: Arc<dyn ChatModel>, tools: Arc<dyn ToolExecutor>) -> Self {
        Self {
            model,
            tools,
            max_rounds: DEFAULT_MAX_ROUNDS,
            sink: None,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn TranscriptSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Drive the loop from Start to Terminal, appending to `conversation`.
    ///
    /// The caller is expected to have appended the human turn already. On
    /// error the conversation may hold a partial turn; callers must not
    /// persist it.
    pub async fn run(
        &self,
        session_id: &str,
        conversation: &mut Conversation,
    ) -> Result<TurnOutcome, AgentError> {
        let mut state = GraphState::Start;
        let mut rounds = 0usize;
        let mut tool_calls = 0usize;

        loop {
            state = match state {
                GraphState::Start => GraphState::Agent,
                GraphState::Agent => {
                    rounds += 1;
                    let next = self.agent_step(session_id, rounds, conversation).await?;
                    if next == GraphState::Tools && rounds >= self.max_rounds {
                        tracing::warn!(
                            session_id = %session_id,
                            rounds,
                            "round limit reached with tool calls still pending"
                        );
                        return Err(AgentError::RoundLimitExceeded { rounds });
                    }
                    next
                }
                GraphState::Tools => {
                    tool_calls += self.tools_step(session_id, conversation).await;
                    GraphState::Agent
                }
                GraphState::Terminal => {
                    let messages = conversation.messages();
                    if let Some(sink) = &self.sink {
                        sink.observe(session_id, &messages);
                    }
                    let final_text = messages
                        .last()
                        .map(|m| m.text().to_string())
                        .unwrap_or_default();

                    tracing::info!(
                        session_id = %session_id,
                        rounds,
                        tool_calls,
                        input_tokens = conversation.usage.input_tokens,
                        output_tokens = conversation.usage.output_tokens,
                        "=== AGENT LOOP COMPLETE ==="
                    );
                    return Ok(TurnOutcome {
                        final_text,
                        rounds,
                        tool_calls,
                    });
                }
            };
        }
    }

    async fn agent_step(
        &self,
        session_id: &str,
        round: usize,
        conversation: &mut Conversation,
    ) -> Result<GraphState, AgentError> {
        let messages = conversation.messages();
        tracing::info!(
            session_id = %session_id,
            round,
            message_count = messages.len(),
            "=== AGENT ROUND START ==="
        );

        let reply = self
            .model
            .invoke(SYSTEM_INSTRUCTION, &messages, &self.tools.definitions())
            .await
            .map_err(|e| {
                tracing::error!(session_id = %session_id, round, error = %e, "reasoning model failed");
                AgentError::from(e)
            })?;

        // Absent usage contributes zero.
        if let Some(usage) = reply.usage {
            conversation.usage.add(usage);
        }
        conversation.push(reply.turn);

        let next = conversation
            .last_message()
            .map(|m| route(&m))
            .unwrap_or(GraphState::Terminal);

        tracing::info!(
            session_id = %session_id,
            round,
            next = ?next,
            "agent round complete"
        );
        Ok(next)
    }

    /// Run every call of the latest assistant turn; returns how many ran.
    async fn tools_step(&self, session_id: &str, conversation: &mut Conversation) -> usize {
        let calls: Vec<ToolCall> = conversation
            .last_message()
            .map(|m| m.tool_calls().to_vec())
            .unwrap_or_default();

        tracing::info!(
            session_id = %session_id,
            tool_calls_count = calls.len(),
            tools = ?calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            "dispatching tool calls"
        );

        // join_all yields results in input order regardless of completion order.
        let results = join_all(calls.iter().map(|call| self.tools.execute(call))).await;
        for (call, text) in calls.iter().zip(results) {
            conversation.push(Message::tool_result(call.id.clone(), text));
        }
        calls.len()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
