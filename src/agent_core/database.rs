//! SQLite checkpoint store for sessions and their conversation turns.
//!
//! Uses `rusqlite` in synchronous mode behind a mutex; the async store wrapper
//! runs every call on the blocking thread pool. WAL mode is enabled so reads
//! don't wait on an in-flight save.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::checkpoint::CheckpointStore;
use super::errors::AgentError;
use super::types::{Conversation, TokenUsage, Turn};

// ─── Types ──────────────────────────────────────────────────────────────────

/// Metadata row for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: String,
    /// RFC 3339 timestamps.
    pub created_at: String,
    pub last_activity: String,
    pub usage: TokenUsage,
}

// ─── Database ───────────────────────────────────────────────────────────────

/// SQLite database handle for conversation checkpoints.
pub struct AgentDatabase {
    conn: Connection,
}

impl AgentDatabase {
    /// Open (or create) the checkpoint database at the given path.
    ///
    /// Pass `":memory:"` for an in-memory database (tests).
    pub fn open(path: &str) -> Result<Self, AgentError> {
        let conn = Connection::open(path)?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Self { conn };
        db.create_tables()?;
        Ok(db)
    }

    /// Create all required tables if they don't exist.
    fn create_tables(&self) -> Result<(), AgentError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                last_activity TEXT NOT NULL,
                input_tokens INTEGER NOT NULL DEFAULT 0,
                output_tokens INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS conversation_turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                tool_calls TEXT,
                tool_call_id TEXT,
                FOREIGN KEY (session_id) REFERENCES sessions(id),
                UNIQUE (session_id, position)
            );
            ",
        )?;
        Ok(())
    }

    // ─── Sessions ───────────────────────────────────────────────────────

    /// Get a session by ID.
    pub fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>, AgentError> {
        let result = self
            .conn
            .query_row(
                "SELECT id, created_at, last_activity, input_tokens, output_tokens
                 FROM sessions WHERE id = ?1",
                params![session_id],
                |row| {
                    Ok(SessionRecord {
                        id: row.get(0)?,
                        created_at: row.get(1)?,
                        last_activity: row.get(2)?,
                        usage: TokenUsage::new(
                            row.get::<_, i64>(3)?.max(0) as u64,
                            row.get::<_, i64>(4)?.max(0) as u64,
                        ),
                    })
                },
            )
            .optional()?;
        Ok(result)
    }

    /// Count stored turns in a session.
    pub fn turn_count(&self, session_id: &str) -> Result<usize, AgentError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM conversation_turns WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // ─── Conversations ──────────────────────────────────────────────────

    /// Load the full conversation for a session, oldest turn first.
    pub fn load_conversation(&self, session_id: &str) -> Result<Option<Conversation>, AgentError> {
        let Some(session) = self.get_session(session_id)? else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT role, content, tool_calls, tool_call_id
             FROM conversation_turns
             WHERE session_id = ?1
             ORDER BY position ASC",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        let mut turns = Vec::new();
        for row in rows {
            let (role, content, tool_calls, tool_call_id) = row?;
            turns.push(Turn {
                role,
                content: serde_json::from_str(&content)?,
                tool_calls: match tool_calls {
                    Some(json) => serde_json::from_str(&json)?,
                    None => Vec::new(),
                },
                tool_call_id,
            });
        }

        Ok(Some(Conversation {
            turns,
            usage: session.usage,
        }))
    }

    /// Save a conversation, appending only the turns not stored yet.
    ///
    /// History is append-only: a conversation shorter than what is stored is
    /// rejected rather than truncating the session.
    pub fn save_conversation(
        &mut self,
        session_id: &str,
        conversation: &Conversation,
    ) -> Result<(), AgentError> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO sessions (id, created_at, last_activity, input_tokens, output_tokens)
             VALUES (?1, ?2, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                last_activity = excluded.last_activity,
                input_tokens = excluded.input_tokens,
                output_tokens = excluded.output_tokens",
            params![
                session_id,
                now,
                conversation.usage.input_tokens as i64,
                conversation.usage.output_tokens as i64,
            ],
        )?;

        let stored: i64 = tx.query_row(
            "SELECT COUNT(*) FROM conversation_turns WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        let stored = stored as usize;
        if stored > conversation.turns.len() {
            return Err(AgentError::StoreError {
                reason: format!(
                    "session '{session_id}' has {stored} stored turns; refusing to save {}",
                    conversation.turns.len()
                ),
            });
        }

        for (position, turn) in conversation.turns.iter().enumerate().skip(stored) {
            let content = serde_json::to_string(&turn.content)?;
            let tool_calls = if turn.tool_calls.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&turn.tool_calls)?)
            };
            tx.execute(
                "INSERT INTO conversation_turns
                 (session_id, position, timestamp, role, content, tool_calls, tool_call_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    session_id,
                    position as i64,
                    now,
                    turn.role,
                    content,
                    tool_calls,
                    turn.tool_call_id,
                ],
            )?;
        }

        tx.commit()?;

        tracing::debug!(
            session_id = %session_id,
            appended = conversation.turns.len() - stored,
            total = conversation.turns.len(),
            "conversation checkpoint saved"
        );
        Ok(())
    }
}

// ─── Async Store ────────────────────────────────────────────────────────────

/// `CheckpointStore` over an `AgentDatabase`.
#[derive(Clone)]
pub struct SqliteCheckpointStore {
    db: Arc<Mutex<AgentDatabase>>,
}

impl SqliteCheckpointStore {
    pub fn new(db: AgentDatabase) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    pub fn open(path: &str) -> Result<Self, AgentError> {
        Ok(Self::new(AgentDatabase::open(path)?))
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, session_id: &str) -> Result<Option<Conversation>, AgentError> {
        let db = Arc::clone(&self.db);
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || {
            let db = db.lock().unwrap_or_else(PoisonError::into_inner);
            db.load_conversation(&session_id)
        })
        .await?
    }

    async fn save(&self, session_id: &str, conversation: &Conversation) -> Result<(), AgentError> {
        let db = Arc::clone(&self.db);
        let session_id = session_id.to_string();
        let conversation = conversation.clone();
        tokio::task::spawn_blocking(move || {
            let mut db = db.lock().unwrap_or_else(PoisonError::into_inner);
            db.save_conversation(&session_id, &conversation)
        })
        .await?
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
