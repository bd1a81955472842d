//! Conversation checkpointing.
//!
//! A store maps a session key to its `Conversation`. The turn runner loads
//! before a turn and saves after a successful one; a failed turn is never
//! saved, so the stored history only ever contains completed turns.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::errors::AgentError;
use super::types::Conversation;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// The stored conversation for `session_id`, or `None` if it has none yet.
    async fn load(&self, session_id: &str) -> Result<Option<Conversation>, AgentError>;

    /// Persist `conversation` as the current state of `session_id`.
    async fn save(&self, session_id: &str, conversation: &Conversation) -> Result<(), AgentError>;
}

/// Process-local store. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    sessions: RwLock<HashMap<String, Conversation>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, session_id: &str) -> Result<Option<Conversation>, AgentError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn save(&self, session_id: &str, conversation: &Conversation) -> Result<(), AgentError> {
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), conversation.clone());
        Ok(())
    }
}
