//! Database tools: schema discovery and guarded query execution.
//!
//! Submodules:
//! - `backend`: backend connection traits and the rusqlite adapter
//! - `pool`: bounded connection pool with RAII return
//! - `safety`: read-only statement classifier
//! - `gateway`: the tool catalogue the model calls
//! - `errors`: internal error type (never surfaced past the gateway)

pub mod backend;
pub mod errors;
pub mod gateway;
pub mod pool;
pub mod safety;

// Re-exports for convenience
pub use backend::{BackendConnection, ConnectionFactory, Row, SqliteConnectionFactory};
pub use errors::DbToolError;
pub use gateway::{ToolGateway, DEFAULT_ROW_LIMIT};
pub use pool::{ConnectionPool, PoolConfig, PoolStatus, PooledConnection};
pub use safety::{classify, SafetyVerdict};
