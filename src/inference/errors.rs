//! Failures of the reasoning client.
//!
//! The graph wraps any of these into `AgentError::ReasoningFailed`; the HTTP
//! layer turns that into a 502. Within the client, `triggers_fallback` decides
//! whether the next model in the chain gets a try.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferenceError {
    /// The chat-completions endpoint could not be reached, or the HTTP client
    /// could not be built for it.
    #[error("reasoning endpoint {endpoint} unreachable: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// No complete reply within the model's `request_timeout_secs`.
    #[error("reasoning model gave no reply within {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// The active model and every fallback failed with a fallback-worthy error.
    #[error("no reasoning model answered (tried: {})", attempted.join(", "))]
    AllModelsUnavailable { attempted: Vec<String> },

    /// The endpoint answered with a non-2xx status. `body` is kept verbatim
    /// because providers put the useful detail there.
    #[error("reasoning endpoint returned HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// A 2xx body that is not a chat completion with at least one choice.
    #[error("unreadable chat completion: {reason}")]
    MalformedResponse { reason: String },

    /// The `models` config section names no usable model.
    #[error("invalid models configuration: {reason}")]
    ConfigError { reason: String },
}

impl InferenceError {
    /// Whether the next model in the fallback chain should be tried.
    ///
    /// 404 counts: self-hosted runtimes answer 404 for a model that is not
    /// installed, and the next entry may be. A 400 or an unreadable body means
    /// the request itself is at fault, so another model would not help.
    pub fn triggers_fallback(&self) -> bool {
        matches!(
            self,
            InferenceError::ConnectionFailed { .. }
                | InferenceError::Timeout { .. }
                | InferenceError::HttpError {
                    status: 404 | 429 | 500 | 502..=504,
                    ..
                }
        )
    }
}
