//! Request and response bodies for the HTTP transport.

use serde::{Deserialize, Serialize};

use crate::agent_core::TokenUsage;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    /// Omitted or blank starts a new session.
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    pub final_text: String,
    pub session_id: String,
    pub usage: UsageDto,
    pub cost_estimate: f64,
}

/// Cumulative usage of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageDto {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl From<TokenUsage> for UsageDto {
    fn from(usage: TokenUsage) -> Self {
        Self {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.total(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub ready: bool,
}
