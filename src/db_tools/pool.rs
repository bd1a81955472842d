//! Bounded connection pool on top of `r2d2`.
//!
//! `r2d2` owns the bookkeeping: at most `max` connections exist, `min` are kept
//! idle, and every connection is health-checked at checkout (a dead one is
//! dropped and replaced). The backend stays behind `ConnectionFactory`, so the
//! pool manager here is a thin adapter. Checkout blocks, so it runs on the
//! blocking thread pool.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::backend::{BackendConnection, ConnectionFactory, Row};
use super::errors::DbToolError;

// ─── Config ──────────────────────────────────────────────────────────────────

/// Pool bounds, from the `database.pool` config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_min")]
    pub min: usize,
    #[serde(default = "default_max")]
    pub max: usize,
    /// How long startup waits for the first `min` connections, and how long a
    /// single checkout attempt waits before the pool re-checks whether the
    /// backend is reachable at all.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_min() -> usize {
    1
}

fn default_max() -> usize {
    5
}

fn default_connect_timeout_secs() -> u64 {
    30
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min: default_min(),
            max: default_max(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl PoolConfig {
    fn validate(&self) -> Result<(u32, u32), DbToolError> {
        let invalid = |reason: String| DbToolError::InvalidPoolConfig { reason };
        if self.max == 0 || self.min > self.max {
            return Err(invalid(format!(
                "expected 0 <= min <= max and max > 0, got min={} max={}",
                self.min, self.max
            )));
        }
        if self.connect_timeout_secs == 0 {
            return Err(invalid("connect_timeout_secs must be at least 1".to_string()));
        }
        let max = u32::try_from(self.max).map_err(|_| invalid(format!("max={} is too large", self.max)))?;
        // min <= max, so this cannot overflow once max fits.
        let min = self.min as u32;
        Ok((min, max))
    }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub max: usize,
    pub idle: usize,
    pub in_use: usize,
}

// ─── r2d2 adapter ────────────────────────────────────────────────────────────

/// Lets `r2d2` open and validate connections through a `ConnectionFactory`.
struct FactoryManager {
    factory: Arc<dyn ConnectionFactory>,
}

impl r2d2::ManageConnection for FactoryManager {
    type Connection = Box<dyn BackendConnection>;
    type Error = DbToolError;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        self.factory.connect()
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        if conn.is_alive() {
            Ok(())
        } else {
            Err(DbToolError::ConnectFailed {
                target: self.factory.target(),
                reason: "pooled connection failed its liveness check".to_string(),
            })
        }
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Routes r2d2's background connect and validation failures into tracing.
#[derive(Debug)]
struct TracingErrorHandler {
    target: String,
}

impl r2d2::HandleError<DbToolError> for TracingErrorHandler {
    fn handle_error(&self, error: DbToolError) {
        tracing::warn!(target_db = %self.target, error = %error, "connection pool error");
    }
}

// ─── Pool ────────────────────────────────────────────────────────────────────

/// A shared, bounded pool of backend connections.
///
/// Cloning is cheap; clones share the same connections.
#[derive(Clone)]
pub struct ConnectionPool {
    pool: r2d2::Pool<FactoryManager>,
    target: Arc<str>,
}

impl ConnectionPool {
    /// Build the pool and eagerly open `config.min` connections.
    ///
    /// Fails with `ConnectFailed` if those are not up within
    /// `connect_timeout_secs`.
    pub fn new(factory: Arc<dyn ConnectionFactory>, config: PoolConfig) -> Result<Self, DbToolError> {
        let (min, max) = config.validate()?;
        let target: Arc<str> = factory.target().into();

        let pool = r2d2::Pool::builder()
            .max_size(max)
            .min_idle(Some(min))
            .test_on_check_out(true)
            .connection_timeout(Duration::from_secs(config.connect_timeout_secs))
            .error_handler(Box::new(TracingErrorHandler {
                target: target.to_string(),
            }))
            .build(FactoryManager { factory })
            .map_err(|e| DbToolError::ConnectFailed {
                target: target.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            target_db = %target,
            min = config.min,
            max = config.max,
            "connection pool initialized"
        );

        Ok(Self { pool, target })
    }

    /// Borrow a connection, waiting while the pool is at capacity.
    ///
    /// The guard comes back from the blocking pool; if this future is dropped
    /// while waiting, the blocking task still drops (and so returns) whatever
    /// it checked out.
    pub async fn acquire(&self) -> Result<PooledConnection, DbToolError> {
        let pool = self.pool.clone();
        let target = Arc::clone(&self.target);
        let conn = tokio::task::spawn_blocking(move || checkout(&pool, &target)).await??;
        Ok(PooledConnection { conn })
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.pool.state();
        PoolStatus {
            max: self.pool.max_size() as usize,
            idle: state.idle_connections as usize,
            in_use: (state.connections - state.idle_connections) as usize,
        }
    }
}

/// Blocking checkout. A timeout while every connection is lent out just means
/// the pool is busy, so keep waiting; a timeout below capacity means new
/// connections cannot be opened, which is reported.
fn checkout(
    pool: &r2d2::Pool<FactoryManager>,
    target: &str,
) -> Result<r2d2::PooledConnection<FactoryManager>, DbToolError> {
    loop {
        match pool.get() {
            Ok(conn) => return Ok(conn),
            Err(_) if is_saturated(pool) => {
                tracing::debug!(target_db = %target, "pool saturated, still waiting for a release");
            }
            Err(e) => {
                return Err(DbToolError::ConnectFailed {
                    target: target.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

fn is_saturated(pool: &r2d2::Pool<FactoryManager>) -> bool {
    let state = pool.state();
    state.connections >= pool.max_size() && state.idle_connections == 0
}

// ─── Guard ───────────────────────────────────────────────────────────────────

/// A borrowed connection. Dropping it returns the connection to the pool.
///
/// `Send`, so it can be moved into `spawn_blocking`; a cancelled request
/// still drops it when the blocking task finishes.
pub struct PooledConnection {
    conn: r2d2::PooledConnection<FactoryManager>,
}

impl PooledConnection {
    /// Run one statement, reading at most `max_rows` rows when given.
    pub fn execute(
        &mut self,
        sql: &str,
        params: &[Value],
        max_rows: Option<usize>,
    ) -> Result<Vec<Row>, DbToolError> {
        self.conn.execute(sql, params, max_rows)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
