//! Agent Core error types.

use thiserror::Error;

use crate::inference::InferenceError;

/// Errors that can end a chat turn.
///
/// Tool failures are deliberately absent: they become tool-result text and
/// the loop carries on.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The reasoning model could not produce a response.
    #[error("reasoning model failed: {source}")]
    ReasoningFailed {
        #[from]
        source: InferenceError,
    },

    /// The agent did not reach a final answer within the round budget.
    #[error("no final answer after {rounds} agent rounds")]
    RoundLimitExceeded { rounds: usize },

    /// The whole turn exceeded its deadline.
    #[error("turn timed out after {duration_secs}s")]
    TurnTimeout { duration_secs: u64 },

    /// Database operation failed.
    #[error("database error: {reason}")]
    DatabaseError { reason: String },

    /// Checkpoint store failed for a reason other than the database itself.
    #[error("checkpoint store error: {reason}")]
    StoreError { reason: String },

    /// Serialization error.
    #[error("serialization error: {reason}")]
    SerializationError { reason: String },
}

impl From<rusqlite::Error> for AgentError {
    fn from(e: rusqlite::Error) -> Self {
        AgentError::DatabaseError {
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::SerializationError {
            reason: e.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for AgentError {
    fn from(e: tokio::task::JoinError) -> Self {
        AgentError::StoreError {
            reason: format!("store worker failed: {e}"),
        }
    }
}
