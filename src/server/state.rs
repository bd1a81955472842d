//! Shared server state.
//!
//! The runtime slot starts empty and is filled once background
//! initialization succeeds; until then every chat request gets 503.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use super::session_lock::SessionLocks;
use crate::agent_core::{AgentGraph, CheckpointStore};
use crate::config::Pricing;

/// Everything a chat turn needs once the service is initialized.
pub struct AgentRuntime {
    pub graph: AgentGraph,
    pub store: Arc<dyn CheckpointStore>,
    pub turn_timeout: Option<Duration>,
}

pub struct AppState {
    runtime: RwLock<Option<Arc<AgentRuntime>>>,
    sessions: SessionLocks,
    pricing: Pricing,
}

impl AppState {
    pub fn new(pricing: Pricing) -> Self {
        Self {
            runtime: RwLock::new(None),
            sessions: SessionLocks::new(),
            pricing,
        }
    }

    /// Mark the service ready.
    pub fn install(&self, runtime: AgentRuntime) {
        *self.runtime.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(runtime));
    }

    /// The runtime, or `None` while initialization is still running.
    pub fn runtime(&self) -> Option<Arc<AgentRuntime>> {
        self.runtime.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_ready(&self) -> bool {
        self.runtime.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    pub fn sessions(&self) -> &SessionLocks {
        &self.sessions
    }

    pub fn pricing(&self) -> &Pricing {
        &self.pricing
    }
}
