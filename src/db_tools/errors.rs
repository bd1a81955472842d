//! Database tool error types.
//!
//! These never leave the gateway: every variant is rendered to a tool-result
//! string before it reaches the agent loop.

use thiserror::Error;

/// Errors raised by the pool, the backend adapter, or gateway internals.
#[derive(Debug, Error)]
pub enum DbToolError {
    /// Opening a new backend connection failed, or the pool could not hand
    /// one out because none could be opened.
    #[error("failed to connect to {target}: {reason}")]
    ConnectFailed { target: String, reason: String },

    /// The backend rejected or failed to run a statement.
    #[error("query failed: {reason}")]
    QueryFailed { reason: String },

    /// Pool bounds are inconsistent (`min > max`, `max == 0`).
    #[error("invalid pool configuration: {reason}")]
    InvalidPoolConfig { reason: String },

    /// The blocking worker running a backend call panicked or was cancelled.
    #[error("backend worker failed: {reason}")]
    WorkerFailed { reason: String },
}

impl From<rusqlite::Error> for DbToolError {
    fn from(e: rusqlite::Error) -> Self {
        DbToolError::QueryFailed {
            reason: e.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for DbToolError {
    fn from(e: tokio::task::JoinError) -> Self {
        DbToolError::WorkerFailed {
            reason: e.to_string(),
        }
    }
}
