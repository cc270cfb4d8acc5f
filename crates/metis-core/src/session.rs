//! Session storage
//!
//! A session is an append-only message log keyed by session id, shared
//! by all three roles during one orchestration run so later roles see
//! earlier role outputs as conversational context. SQLite is the
//! default backend; the in-memory backend exists for tests.

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use metis_llm::Message;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Session id used when the caller opts into a reusable conversation
pub const DEFAULT_SESSION_ID: &str = "chat_session";

/// How a session id is chosen for a run
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Reuse the default conversation instead of starting fresh
    pub reuse: bool,
    /// Explicit session id, overriding both other behaviors
    pub id: Option<String>,
}

/// Resolve the session id for a run.
///
/// An explicit id is used as-is. Otherwise a reuse run gets the default
/// id with its transcript intact, and a fresh run gets a generated id.
/// A fresh run that lands on the default id clears its backing rows
/// first.
pub async fn resolve_session(
    store: &dyn SessionStore,
    options: &SessionOptions,
) -> Result<String> {
    let id = match &options.id {
        Some(id) => id.clone(),
        None if options.reuse => DEFAULT_SESSION_ID.to_string(),
        None => uuid::Uuid::new_v4().to_string(),
    };

    if !options.reuse && id == DEFAULT_SESSION_ID {
        store.clear(&id).await?;
        debug!(session_id = %id, "cleared default session for fresh run");
    }

    Ok(id)
}

/// Trait for session storage backends
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The session's message log, in append order
    async fn history(&self, session_id: &str) -> Result<Vec<Message>>;

    /// Append messages to the session's log
    async fn append(&self, session_id: &str, messages: &[Message]) -> Result<()>;

    /// Remove every message of the session, keeping the id usable
    async fn clear(&self, session_id: &str) -> Result<()>;

    /// Delete the session entirely; returns whether anything was removed
    async fn delete(&self, session_id: &str) -> Result<bool>;
}

/// SQLite session store
///
/// The default and recommended backend: persistent storage without an
/// external service.
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Create a store at the specified path.
    ///
    /// # Errors
    /// Returns error if database creation or schema setup fails.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Session(format!("failed to create database directory: {e}"))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| Error::Session(format!("invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| Error::Session(format!("failed to connect to SQLite: {e}")))?;

        let store = Self { pool };
        store.init_schema().await?;

        info!(path = %path.display(), "SQLite session store initialized");
        Ok(store)
    }

    /// Create a store at the default location (`~/.metis/sessions.db`)
    pub async fn new_default() -> Result<Self> {
        let path = Self::default_path()?;
        Self::new(&path).await
    }

    /// The default database path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Session("could not determine home directory".to_string()))?;
        Ok(home.join(".metis").join("sessions.db"))
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                message TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Session(format!("failed to create messages table: {e}")))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_session_messages_session_id
                ON session_messages(session_id)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Session(format!("failed to create index: {e}")))?;

        debug!("SQLite session schema initialized");
        Ok(())
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<bool> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Session(format!("health check failed: {e}")))?;
        Ok(true)
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn history(&self, session_id: &str) -> Result<Vec<Message>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT message FROM session_messages WHERE session_id = ? ORDER BY id")
                .bind(session_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| Error::Session(format!("failed to load session: {e}")))?;

        let mut messages = Vec::with_capacity(rows.len());
        for (data,) in rows {
            match serde_json::from_str::<Message>(&data) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "dropping undecodable session message");
                }
            }
        }

        Ok(messages)
    }

    async fn append(&self, session_id: &str, messages: &[Message]) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        for message in messages {
            let data = serde_json::to_string(message)
                .map_err(|e| Error::Session(format!("failed to serialize message: {e}")))?;

            sqlx::query(
                "INSERT INTO session_messages (session_id, message, created_at) VALUES (?, ?, ?)",
            )
            .bind(session_id)
            .bind(&data)
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Session(format!("failed to append message: {e}")))?;
        }

        debug!(session_id = %session_id, count = messages.len(), "messages appended");
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM session_messages WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Session(format!("failed to clear session: {e}")))?;
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM session_messages WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Session(format!("failed to delete session: {e}")))?;

        Ok(result.rows_affected() > 0)
    }
}

/// In-memory session store, for tests
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Vec<Message>>>,
}

impl MemorySessionStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn history(&self, session_id: &str) -> Result<Vec<Message>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }

    async fn append(&self, session_id: &str, messages: &[Message]) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_default()
            .extend(messages.iter().cloned());
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if let Some(log) = sessions.get_mut(session_id) {
            log.clear();
        }
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.remove(session_id).is_some())
    }
}
