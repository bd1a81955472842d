//! Agent Core: orchestration layer for nl2sql-agent.
//!
//! Submodules:
//! - `types`: Canonical messages, raw stored turns, usage, conversation
//! - `reconciler`: Normalizes raw turns into canonical messages
//! - `model`: Reasoning component seam (`ChatModel`)
//! - `graph`: Agent ⇄ Tools state machine
//! - `turn`: One chat turn: load, run, save
//! - `checkpoint`: Checkpoint store trait and in-memory store
//! - `database`: SQLite checkpoint store
//! - `errors`: Agent-level error types

pub mod checkpoint;
pub mod database;
pub mod errors;
pub mod graph;
pub mod model;
pub mod reconciler;
pub mod turn;
pub mod types;

// Re-exports for convenience
pub use checkpoint::{CheckpointStore, MemoryCheckpointStore};
pub use database::{AgentDatabase, SqliteCheckpointStore};
pub use errors::AgentError;
pub use graph::{AgentGraph, GraphState, ToolExecutor, TracingTranscript, TranscriptSink, TurnOutcome};
pub use model::{ChatModel, ModelReply};
pub use reconciler::reconcile;
pub use turn::{run_chat_turn, TurnReport};
pub use types::{Conversation, Message, TokenUsage, Turn};
