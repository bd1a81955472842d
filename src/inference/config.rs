//! Model registry configuration.
//!
//! Mirrors the `models:` section of the service config. The active model is
//! tried first, then every entry of the fallback chain in order.

use std::collections::HashMap;

use serde::Deserialize;

use super::errors::InferenceError;

/// Marker entry in `fallback_chain` that is never a real endpoint.
pub const STATIC_RESPONSE_KEY: &str = "static_response";

/// A single model's runtime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub display_name: String,
    /// Model identifier sent in the request. Defaults to the registry key.
    #[serde(default)]
    pub model_name: Option<String>,
    /// Base URL up to and including the API version, e.g. `https://api.deepseek.com/v1`.
    pub base_url: String,
    /// Bearer token. Usually `${SOME_API_KEY}` in the config file.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Whole-request timeout for one completion call.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_request_timeout_secs() -> u64 {
    60
}

/// Top-level model registry.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    pub active_model: String,
    pub models: HashMap<String, ModelConfig>,
    #[serde(default)]
    pub fallback_chain: Vec<String>,
}

/// Resolve the active model configuration, respecting the fallback chain.
///
/// Returns `(model_key, ModelConfig)` for the first model that exists in the
/// config. Actual connectivity is checked at runtime by the client.
pub fn resolve_active_model(config: &ModelsConfig) -> Result<(String, ModelConfig), InferenceError> {
    if let Some(model) = config.models.get(&config.active_model) {
        return Ok((config.active_model.clone(), model.clone()));
    }

    for key in &config.fallback_chain {
        if key == STATIC_RESPONSE_KEY {
            continue;
        }
        if let Some(model) = config.models.get(key) {
            return Ok((key.clone(), model.clone()));
        }
    }

    Err(InferenceError::ConfigError {
        reason: format!(
            "active model '{}' not found in config and no fallback available",
            config.active_model
        ),
    })
}
