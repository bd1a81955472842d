//! HTTP transport: `POST /chat` and `GET /health`.
//!
//! The listener is bound and serving before initialization finishes, so
//! health probes get an answer immediately. Initialization (pool, reasoning
//! client, checkpoint store) runs in the background; if it fails the server
//! shuts down and `serve` returns the error.

pub mod dto;
pub mod routes;
pub mod session_lock;
pub mod state;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::agent_core::{
    AgentGraph, ChatModel, CheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore,
    TracingTranscript,
};
use crate::config::{AppConfig, CheckpointConfig};
use crate::db_tools::{ConnectionPool, SqliteConnectionFactory, ToolGateway};
use crate::inference::InferenceClient;
use state::{AgentRuntime, AppState};

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("initialization failed: {reason}")]
    Init { reason: String },
}

impl ServerError {
    fn init(reason: impl std::fmt::Display) -> Self {
        ServerError::Init {
            reason: reason.to_string(),
        }
    }
}

// ─── Router ──────────────────────────────────────────────────────────────────

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat", post(routes::chat_handler))
        .route("/health", get(routes::health_handler))
        .with_state(state)
}

/// Bind, serve, and initialize in the background until shutdown.
pub async fn serve(config: AppConfig) -> Result<(), ServerError> {
    let addr = config.server.bind.clone();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    let local_addr: Option<SocketAddr> = listener.local_addr().ok();
    info!(addr = %addr, local_addr = ?local_addr, "HTTP server listening");

    let state = Arc::new(AppState::new(config.pricing));
    let (failed_tx, failed_rx) = oneshot::channel::<ServerError>();
    let init_failure: Arc<Mutex<Option<ServerError>>> = Arc::default();
    let init = tokio::spawn(initialize(config, Arc::clone(&state), failed_tx));

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(failed_rx, Arc::clone(&init_failure)))
        .await
        .map_err(ServerError::Serve)?;

    init.abort();
    let failure = init_failure
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Resolves on Ctrl-C or when initialization reports a failure, which is
/// parked in `slot` for `serve` to return.
async fn shutdown_signal(
    init_failed: oneshot::Receiver<ServerError>,
    slot: Arc<Mutex<Option<ServerError>>>,
) {
    // A dropped sender means initialization succeeded.
    let init_failed = async {
        match init_failed.await {
            Ok(e) => e,
            Err(_) => std::future::pending().await,
        }
    };
    tokio::select! {
        e = init_failed => {
            warn!("initialization failed; shutting down");
            *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(e);
        }
        _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
    }
}

async fn initialize(config: AppConfig, state: Arc<AppState>, failed_tx: oneshot::Sender<ServerError>) {
    match build_from_config(config).await {
        Ok(runtime) => {
            state.install(runtime);
            info!("=== nl2sql-agent ready ===");
        }
        Err(e) => {
            error!(error = %e, "initialization failed");
            let _ = failed_tx.send(e);
        }
    }
}

async fn build_from_config(config: AppConfig) -> Result<AgentRuntime, ServerError> {
    let client = InferenceClient::from_config(config.models.clone()).map_err(ServerError::init)?;
    if client.health_check().await {
        info!(model = client.primary_model_name(), "reasoning endpoint reachable");
    } else {
        warn!(
            model = client.primary_model_name(),
            "reasoning endpoint not reachable yet; requests will retry per call"
        );
    }

    // Opening the pool's eager connections blocks.
    tokio::task::spawn_blocking(move || build_runtime(&config, Arc::new(client)))
        .await
        .map_err(|e| ServerError::init(format!("init worker failed: {e}")))?
}

// ─── Wiring ──────────────────────────────────────────────────────────────────

/// Assemble pool, gateway, graph, and checkpoint store.
pub fn build_runtime(
    config: &AppConfig,
    model: Arc<dyn ChatModel>,
) -> Result<AgentRuntime, ServerError> {
    let factory = SqliteConnectionFactory::new(&config.database.path);
    let pool = ConnectionPool::new(Arc::new(factory), config.database.pool).map_err(ServerError::init)?;
    info!(
        database = %config.database.path.display(),
        schema = %config.database.schema,
        pool_min = config.database.pool.min,
        pool_max = config.database.pool.max,
        "connection pool ready"
    );

    let gateway = ToolGateway::new(pool, config.database.schema.clone(), config.agent.row_limit);
    let graph = AgentGraph::new(model, Arc::new(gateway))
        .with_max_rounds(config.agent.max_rounds)
        .with_sink(Arc::new(TracingTranscript));

    let store: Arc<dyn CheckpointStore> = match &config.checkpoint {
        CheckpointConfig::Memory => Arc::new(MemoryCheckpointStore::new()),
        CheckpointConfig::Sqlite { path } => {
            let path = path
                .clone()
                .unwrap_or_else(|| crate::data_dir().join("checkpoints.db"));
            Arc::new(open_sqlite_store(&path)?)
        }
    };

    Ok(AgentRuntime {
        graph,
        store,
        turn_timeout: config.agent.turn_timeout_secs.map(Duration::from_secs),
    })
}

fn open_sqlite_store(path: &Path) -> Result<SqliteCheckpointStore, ServerError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| ServerError::init(format!("cannot create {}: {e}", parent.display())))?;
    }
    info!(path = %path.display(), "opening checkpoint store");
    SqliteCheckpointStore::open(&path.to_string_lossy()).map_err(ServerError::init)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
