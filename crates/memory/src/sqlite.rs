//! SQLite memory store.
//!
//! Uses a single SQLite database file with two tables:
//! - `conversations` - one row per turn, response filled in when answered
//! - `long_term_memory` - curated notes with optional free-text keywords
//!
//! Every searchable column has a `*_folded` shadow holding its Unicode
//! lowercase form, written on insert. SQLite's own `LIKE`/`lower()` only
//! fold ASCII, so searches lowercase the query in Rust and use `instr`
//! against the shadows. Results are ordered newest first, with insertion
//! order breaking ties inside one timestamp second.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use falcon_core::error::StorageError;
use falcon_core::memory::{
    turns_to_messages, ConversationTurn, MemoryNote, MemoryStore, NoteId, TurnId, TurnMatch,
};
use falcon_core::message::Message;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// A durable SQLite-backed [`MemoryStore`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a store.
    ///
    /// `path` is either a filesystem path, a `sqlite:` URL, or
    /// `sqlite::memory:` for an ephemeral database (useful for tests).
    /// The parent directory of a filesystem path is created if missing.
    pub async fn new(path: &str) -> Result<Self, StorageError> {
        let in_memory = path.contains(":memory:");

        let options = if path.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(path)
                .map_err(|e| StorageError::Unavailable(format!("Invalid SQLite path: {e}")))?
        } else {
            if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    StorageError::Unavailable(format!(
                        "Cannot create database directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
            SqliteConnectOptions::new().filename(path)
        };

        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // A private in-memory database lives as long as its connection.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Unavailable(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.create_schema().await?;
        info!("SQLite memory store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        let store = Self { pool };
        store.create_schema().await?;
        Ok(store)
    }

    /// Create tables and indexes if they do not exist yet.
    async fn create_schema(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                user_message       TEXT NOT NULL,
                assistant_response TEXT,
                timestamp          DATETIME DEFAULT CURRENT_TIMESTAMP,
                user_folded        TEXT,
                response_folded    TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("conversations table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS long_term_memory (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                memory_content TEXT NOT NULL,
                keywords       TEXT,
                timestamp      DATETIME DEFAULT CURRENT_TIMESTAMP,
                content_folded TEXT,
                keywords_folded TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("long_term_memory table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversations_timestamp ON conversations(timestamp DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("conversations index: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_long_term_memory_timestamp ON long_term_memory(timestamp DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("long_term_memory index: {e}")))?;

        self.ensure_folded_columns().await?;

        debug!("SQLite schema ready");
        Ok(())
    }

    /// Add and backfill the folded shadow columns on databases created
    /// before they existed.
    async fn ensure_folded_columns(&self) -> Result<(), StorageError> {
        let shadows = [
            ("conversations", "user_folded", "user_message"),
            ("conversations", "response_folded", "assistant_response"),
            ("long_term_memory", "content_folded", "memory_content"),
            ("long_term_memory", "keywords_folded", "keywords"),
        ];

        for (table, folded, source) in shadows {
            let row = sqlx::query("SELECT COUNT(*) AS cnt FROM pragma_table_info(?1) WHERE name = ?2")
                .bind(table)
                .bind(folded)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StorageError::MigrationFailed(format!("{table} columns: {e}")))?;
            let present: i64 = row
                .try_get("cnt")
                .map_err(|e| StorageError::MigrationFailed(format!("cnt column: {e}")))?;
            if present > 0 {
                continue;
            }

            sqlx::query(&format!("ALTER TABLE {table} ADD COLUMN {folded} TEXT"))
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::MigrationFailed(format!("{table}.{folded}: {e}")))?;

            let rows = sqlx::query(&format!(
                "SELECT id, {source} AS source FROM {table} WHERE {source} IS NOT NULL"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::MigrationFailed(format!("{table} backfill read: {e}")))?;

            for row in &rows {
                let id: i64 = row
                    .try_get("id")
                    .map_err(|e| StorageError::MigrationFailed(format!("id column: {e}")))?;
                let text: String = row
                    .try_get("source")
                    .map_err(|e| StorageError::MigrationFailed(format!("{source} column: {e}")))?;
                sqlx::query(&format!("UPDATE {table} SET {folded} = ?1 WHERE id = ?2"))
                    .bind(fold(&text))
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| StorageError::MigrationFailed(format!("{table} backfill: {e}")))?;
            }
            info!(table, column = folded, rows = rows.len(), "Backfilled search column");
        }
        Ok(())
    }

    fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationTurn, StorageError> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| StorageError::QueryFailed(format!("id column: {e}")))?;
        let user_message: String = row
            .try_get("user_message")
            .map_err(|e| StorageError::QueryFailed(format!("user_message column: {e}")))?;
        let assistant_response: Option<String> = row
            .try_get("assistant_response")
            .map_err(|e| StorageError::QueryFailed(format!("assistant_response column: {e}")))?;
        let timestamp: NaiveDateTime = row
            .try_get("timestamp")
            .map_err(|e| StorageError::QueryFailed(format!("timestamp column: {e}")))?;

        Ok(ConversationTurn {
            id,
            user_message,
            assistant_response,
            timestamp: timestamp.and_utc(),
        })
    }

    fn row_to_note(row: &sqlx::sqlite::SqliteRow) -> Result<MemoryNote, StorageError> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| StorageError::QueryFailed(format!("id column: {e}")))?;
        let content: String = row
            .try_get("memory_content")
            .map_err(|e| StorageError::QueryFailed(format!("memory_content column: {e}")))?;
        let keywords: Option<String> = row
            .try_get("keywords")
            .map_err(|e| StorageError::QueryFailed(format!("keywords column: {e}")))?;
        let timestamp: NaiveDateTime = row
            .try_get("timestamp")
            .map_err(|e| StorageError::QueryFailed(format!("timestamp column: {e}")))?;

        Ok(MemoryNote {
            id,
            content,
            keywords,
            timestamp: timestamp.and_utc(),
        })
    }
}

/// Search key for a column value or query.
fn fold(text: &str) -> String {
    text.to_lowercase()
}

#[async_trait]
impl MemoryStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn record_turn(&self, user_message: &str) -> Result<TurnId, StorageError> {
        let result = sqlx::query("INSERT INTO conversations (user_message, user_folded) VALUES (?1, ?2)")
            .bind(user_message)
            .bind(fold(user_message))
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("INSERT turn failed: {e}")))?;

        let id = result.last_insert_rowid();
        debug!(turn_id = id, "Recorded conversation turn");
        Ok(id)
    }

    async fn complete_turn(&self, turn_id: TurnId, response: &str) -> Result<(), StorageError> {
        let result = sqlx::query(
            "UPDATE conversations SET assistant_response = ?1, response_folded = ?2 WHERE id = ?3",
        )
        .bind(response)
        .bind(fold(response))
        .bind(turn_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("UPDATE turn failed: {e}")))?;

        if result.rows_affected() == 0 {
            warn!(turn_id, "Tried to complete an unknown conversation turn");
        }
        Ok(())
    }

    async fn recent_turns(&self, limit: usize) -> Result<Vec<Message>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_message, assistant_response, timestamp FROM conversations
            WHERE assistant_response IS NOT NULL
            ORDER BY timestamp DESC, id DESC
            LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("Recent turns: {e}")))?;

        let mut turns = rows.iter().map(Self::row_to_turn).collect::<Result<Vec<_>, _>>()?;
        turns.reverse();
        Ok(turns_to_messages(&turns))
    }

    async fn search_turns(&self, topic: &str, limit: usize) -> Result<Vec<TurnMatch>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_message, assistant_response, timestamp FROM conversations
            WHERE instr(user_folded, ?1) > 0 OR instr(response_folded, ?1) > 0
            ORDER BY timestamp DESC, id DESC
            LIMIT ?2
            "#,
        )
        .bind(fold(topic))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("Turn search: {e}")))?;

        rows.iter()
            .map(|r| Self::row_to_turn(r).map(TurnMatch::from))
            .collect()
    }

    async fn save_note(&self, content: &str, keywords: Option<&str>) -> Result<NoteId, StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO long_term_memory (memory_content, keywords, content_folded, keywords_folded)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(content)
        .bind(keywords)
        .bind(fold(content))
        .bind(keywords.map(fold))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("INSERT note failed: {e}")))?;

        let id = result.last_insert_rowid();
        debug!(note_id = id, "Saved long-term note");
        Ok(id)
    }

    async fn search_notes(&self, query: &str, limit: usize) -> Result<Vec<MemoryNote>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, memory_content, keywords, timestamp FROM long_term_memory
            WHERE instr(content_folded, ?1) > 0 OR instr(keywords_folded, ?1) > 0
            ORDER BY timestamp DESC, id DESC
            LIMIT ?2
            "#,
        )
        .bind(fold(query))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("Note search: {e}")))?;

        rows.iter().map(Self::row_to_note).collect()
    }

    async fn delete_note(&self, id: NoteId) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM long_term_memory WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("DELETE note failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn note_count(&self) -> Result<usize, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM long_term_memory")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("COUNT: {e}")))?;

        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| StorageError::QueryFailed(format!("cnt column: {e}")))?;

        Ok(cnt as usize)
    }

    async fn all_turns(&self) -> Result<Vec<ConversationTurn>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, user_message, assistant_response, timestamp FROM conversations ORDER BY timestamp ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("All turns: {e}")))?;

        rows.iter().map(Self::row_to_turn).collect()
    }
}
