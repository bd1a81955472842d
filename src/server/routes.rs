//! HTTP handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tracing::{error, info, warn};

use super::dto::{ChatRequest, ChatResponse, ErrorResponse, HealthResponse};
use super::state::AppState;
use crate::agent_core::{run_chat_turn, AgentError};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Status code for a failed turn.
pub fn error_status(err: &AgentError) -> StatusCode {
    match err {
        AgentError::ReasoningFailed { .. } => StatusCode::BAD_GATEWAY,
        AgentError::RoundLimitExceeded { .. } | AgentError::TurnTimeout { .. } => {
            StatusCode::GATEWAY_TIMEOUT
        }
        AgentError::DatabaseError { .. }
        | AgentError::StoreError { .. }
        | AgentError::SerializationError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Some(runtime) = state.runtime() else {
        warn!("rejecting /chat request: service not initialized");
        return Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "service is still initializing",
        ));
    };

    let query = payload.query.trim();
    if query.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "query cannot be empty"));
    }

    let session_id = payload
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    info!(session_id = %session_id, "received /chat request");

    let _guard = state.sessions().acquire(&session_id).await;
    let report = run_chat_turn(
        &runtime.graph,
        runtime.store.as_ref(),
        &session_id,
        query,
        runtime.turn_timeout,
    )
    .await
    .map_err(|e| {
        error!(session_id = %session_id, error = %e, "chat turn failed");
        api_error(error_status(&e), e.to_string())
    })?;

    Ok(Json(ChatResponse {
        cost_estimate: state.pricing().estimate(&report.usage),
        final_text: report.final_text,
        session_id: report.session_id,
        usage: report.usage.into(),
    }))
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ready: state.is_ready(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_core::graph::tests::{reply, EchoTools, ScriptedModel};
    use crate::agent_core::{AgentGraph, MemoryCheckpointStore, ModelReply, TokenUsage};
    use crate::config::Pricing;
    use crate::inference::InferenceError;
    use crate::server::dto::UsageDto;
    use crate::server::state::AgentRuntime;

    fn ready_state(replies: Vec<Result<ModelReply, InferenceError>>) -> Arc<AppState> {
        let state = AppState::new(Pricing {
            input_per_million: 1.0,
            output_per_million: 2.0,
        });
        state.install(AgentRuntime {
            graph: AgentGraph::new(ScriptedModel::new(replies), EchoTools::new()),
            store: Arc::new(MemoryCheckpointStore::new()),
            turn_timeout: None,
        });
        Arc::new(state)
    }

    fn request(query: &str, session_id: Option<&str>) -> Json<ChatRequest> {
        Json(ChatRequest {
            query: query.to_string(),
            session_id: session_id.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn test_not_ready_returns_503() {
        let state = Arc::new(AppState::new(Pricing::default()));
        let Json(health) = health_handler(State(Arc::clone(&state))).await;
        assert!(!health.ready);

        let (status, _) = chat_handler(State(state), request("hi", None))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_blank_query_returns_400() {
        let state = ready_state(vec![]);
        let (status, _) = chat_handler(State(state), request("   ", None))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chat_reports_cumulative_usage_and_cost() {
        let state = ready_state(vec![
            Ok(reply("", &[("c1", "list_all_tables")], Some((400_000, 100_000)))),
            Ok(reply("orders and customers", &[], Some((100_000, 50_000)))),
            Ok(reply("yes", &[], Some((500_000, 0)))),
        ]);
        let Json(health) = health_handler(State(Arc::clone(&state))).await;
        assert!(health.ready);

        let Json(first) = chat_handler(State(Arc::clone(&state)), request("tables?", None))
            .await
            .unwrap();
        assert_eq!(first.final_text, "orders and customers");
        assert!(!first.session_id.is_empty());
        assert_eq!(first.usage, UsageDto::from(TokenUsage::new(500_000, 150_000)));
        assert!((first.cost_estimate - 0.8).abs() < 1e-9);

        let Json(second) = chat_handler(
            State(state),
            request("sure?", Some(first.session_id.as_str())),
        )
        .await
        .unwrap();
        assert_eq!(second.session_id, first.session_id);
        assert_eq!(second.usage.total_tokens, 1_150_000);
    }

    #[tokio::test]
    async fn test_reasoning_failure_returns_502() {
        let state = ready_state(vec![Err(InferenceError::HttpError {
            status: 500,
            body: "boom".into(),
        })]);
        let (status, Json(body)) = chat_handler(State(state), request("hi", Some("s1")))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.error.contains("reasoning model failed"));
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            error_status(&AgentError::RoundLimitExceeded { rounds: 10 }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            error_status(&AgentError::TurnTimeout { duration_secs: 5 }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            error_status(&AgentError::StoreError { reason: "x".into() }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
