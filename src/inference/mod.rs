//! Inference Client: OpenAI-compatible API client for the reasoning model.
//!
//! This module handles all communication with the model endpoint:
//! - Non-streaming chat completions with native tool calls
//! - Token usage extraction
//! - Fallback chain management
//! - Model registry configuration (the `models:` config section)
//!
//! The client speaks the OpenAI Chat Completions API, making the model
//! interchangeable via config.

pub mod client;
pub mod config;
pub mod errors;
pub mod response;
pub mod types;

// Re-exports for convenience
pub use client::InferenceClient;
pub use config::{ModelConfig, ModelsConfig};
pub use errors::InferenceError;
pub use types::{ChatMessage, CompletionResponse, Role, ToolCall, ToolDefinition, UsageMetadata};
