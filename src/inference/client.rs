//! OpenAI-compatible inference client.
//!
//! Sends non-streaming chat completion requests to the configured endpoint.
//! Handles the fallback chain when the primary model is unavailable.

use std::time::Duration;

use reqwest::Client as HttpClient;

use super::config::{ModelConfig, ModelsConfig, STATIC_RESPONSE_KEY};
use super::errors::InferenceError;
use super::response::parse_completion_response;
use super::types::{ChatCompletionRequest, ChatMessage, CompletionResponse, ToolDefinition};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// Client for the reasoning model endpoint.
///
/// Holds the full models configuration. Every call walks the candidate list
/// (active model first, then the fallback chain) from the top, so the client
/// is shareable behind `&self` across concurrent sessions.
pub struct InferenceClient {
    http: HttpClient,
    config: ModelsConfig,
    /// Key of the resolved primary model.
    primary_key: String,
}

impl InferenceClient {
    /// Create a new inference client from the models configuration.
    ///
    /// Resolves the active model from config. Does NOT check connectivity;
    /// that happens on the first request.
    pub fn from_config(config: ModelsConfig) -> Result<Self, InferenceError> {
        let (key, model) = super::config::resolve_active_model(&config)?;

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: model.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            config,
            primary_key: key,
        })
    }

    /// Display name of the primary model.
    pub fn primary_model_name(&self) -> &str {
        self.config
            .models
            .get(&self.primary_key)
            .map(|m| m.display_name.as_str())
            .unwrap_or(self.primary_key.as_str())
    }

    /// Models to try, in order: the primary, then each fallback entry that
    /// exists in the registry and hasn't been listed yet.
    fn candidates(&self) -> Vec<(&str, &ModelConfig)> {
        let mut out: Vec<(&str, &ModelConfig)> = Vec::new();
        let keys = std::iter::once(&self.primary_key).chain(self.config.fallback_chain.iter());
        for key in keys {
            if key == STATIC_RESPONSE_KEY || out.iter().any(|(k, _)| *k == key.as_str()) {
                continue;
            }
            if let Some(model) = self.config.models.get(key) {
                out.push((key.as_str(), model));
            }
        }
        out
    }

    // ─── Chat Completion ─────────────────────────────────────────────────

    /// Send a chat completion request, walking the fallback chain on
    /// retriable failures.
    pub async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<CompletionResponse, InferenceError> {
        let mut attempted: Vec<String> = Vec::new();
        let mut last_error: Option<InferenceError> = None;

        for (key, model) in self.candidates() {
            match self.try_request(key, model, &messages, &tools).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.triggers_fallback() => {
                    tracing::warn!(model = %key, error = %e, "model unavailable, trying next in chain");
                    attempted.push(key.to_string());
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        match last_error {
            Some(e) if attempted.len() <= 1 => Err(e),
            _ => Err(InferenceError::AllModelsUnavailable { attempted }),
        }
    }

    /// Attempt a single request against one model.
    async fn try_request(
        &self,
        key: &str,
        model: &ModelConfig,
        messages: &[ChatMessage],
        tools: &Option<Vec<ToolDefinition>>,
    ) -> Result<CompletionResponse, InferenceError> {
        let url = format!("{}/chat/completions", model.base_url.trim_end_matches('/'));

        let body = ChatCompletionRequest {
            model: model.model_name.clone().unwrap_or_else(|| key.to_string()),
            messages: messages.to_vec(),
            tools: tools.clone(),
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            temperature: model.temperature,
            max_tokens: model.max_tokens,
            stream: false,
        };

        // Log the request metadata (not the full body, it can be huge)
        tracing::info!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            tool_count = body.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            max_tokens = body.max_tokens,
            "=== LLM REQUEST ==="
        );

        let mut request = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(model.request_timeout_secs))
            .json(&body);
        if let Some(api_key) = model.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    duration_secs: model.request_timeout_secs,
                }
            } else {
                InferenceError::ConnectionFailed {
                    endpoint: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body_text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    duration_secs: model.request_timeout_secs,
                }
            } else {
                InferenceError::MalformedResponse {
                    reason: format!("failed to read response body: {e}"),
                }
            }
        })?;

        parse_completion_response(&body_text)
    }

    // ─── Health Check ────────────────────────────────────────────────────

    /// Check if the primary model endpoint is reachable.
    ///
    /// Sends a lightweight request to verify connectivity. Does not consume
    /// inference tokens.
    pub async fn health_check(&self) -> bool {
        let Some((_, model)) = self.candidates().into_iter().next() else {
            return false;
        };
        let url = format!("{}/models", model.base_url.trim_end_matches('/'));

        let mut request = self.http.get(&url).timeout(CONNECT_TIMEOUT);
        if let Some(api_key) = model.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.bearer_auth(api_key);
        }
        match request.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
