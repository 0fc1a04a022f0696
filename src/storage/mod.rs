use crate::conversation::Turn;
use crate::error::{RagPersonaError, Result};
use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod types;
pub use types::StoredSession;

/// File name of the database inside the data directory
pub const DATABASE_FILE: &str = "ragpersona.db";

/// SQLite backend shared by the persona store, the embedding index and
/// saved chat sessions.
///
/// A fresh connection is opened per operation; the handle itself is just the
/// database path and is cheap to clone.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    db_path: PathBuf,
}

impl SqliteStorage {
    /// Create a storage instance inside `data_dir`
    ///
    /// Creates the directory and initializes the schema if needed.
    pub fn new(data_dir: &Path) -> Result<Self> {
        Self::new_with_path(data_dir.join(DATABASE_FILE))
    }

    /// Create a storage instance that uses the specified database path.
    ///
    /// # Examples
    ///
    /// ```
    /// use ragpersona::storage::SqliteStorage;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let storage = SqliteStorage::new_with_path(dir.path().join("test.db")).unwrap();
    /// assert!(storage.db_path().exists());
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| RagPersonaError::Storage(e.to_string()))?;
        }

        let storage = Self { db_path };
        storage.init()?;
        Ok(storage)
    }

    /// Path of the underlying database file
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Open a connection with foreign keys enforced
    pub(crate) fn connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to set busy timeout")
            .map_err(|e| RagPersonaError::Storage(e.to_string()))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("Failed to enable foreign keys")
            .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

        Ok(conn)
    }

    /// Initialize the database schema
    fn init(&self) -> Result<()> {
        let conn = self.connection()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS personas (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                embedding_model TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_interaction TEXT
            );
            CREATE TABLE IF NOT EXISTS sources (
                persona_id TEXT NOT NULL REFERENCES personas(id) ON DELETE CASCADE,
                label TEXT NOT NULL,
                origin TEXT NOT NULL,
                chunk_count INTEGER NOT NULL,
                ingested_at TEXT NOT NULL,
                PRIMARY KEY (persona_id, label)
            );
            CREATE TABLE IF NOT EXISTS kb_partitions (
                persona_id TEXT PRIMARY KEY,
                embedding_model TEXT NOT NULL,
                dimension INTEGER,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                persona_id TEXT NOT NULL REFERENCES kb_partitions(persona_id) ON DELETE CASCADE,
                source_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                text TEXT NOT NULL,
                vector BLOB NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_persona_source ON chunks(persona_id, source_id);
            CREATE TABLE IF NOT EXISTS chat_sessions (
                persona_id TEXT PRIMARY KEY,
                turns JSON NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )
        .context("Failed to create tables")
        .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Save or replace the persisted chat history of a persona
    pub fn save_session(&self, persona_id: &str, turns: &[Turn]) -> Result<()> {
        let mut conn = self.connection()?;

        let turns_json = serde_json::to_string(turns)
            .context("Failed to serialize turns")
            .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

        let now = Utc::now().to_rfc3339();

        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

        // Keep created_at of an existing session
        tx.execute(
            "INSERT INTO chat_sessions (persona_id, turns, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(persona_id) DO UPDATE SET turns = excluded.turns, updated_at = excluded.updated_at",
            params![persona_id, turns_json, now],
        )
        .context("Failed to save chat session")
        .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

        tx.commit()
            .context("Failed to commit transaction")
            .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

        tracing::debug!(persona_id, turns = turns.len(), "Saved chat session");
        Ok(())
    }

    /// Load the persisted chat history of a persona, if any
    pub fn load_session(&self, persona_id: &str) -> Result<Option<Vec<Turn>>> {
        let conn = self.connection()?;

        let turns_json: Option<String> = conn
            .query_row(
                "SELECT turns FROM chat_sessions WHERE persona_id = ?",
                params![persona_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query chat session")
            .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

        match turns_json {
            Some(json) => {
                let turns: Vec<Turn> = serde_json::from_str(&json)
                    .context("Failed to deserialize turns")
                    .map_err(|e| RagPersonaError::Storage(e.to_string()))?;
                Ok(Some(turns))
            }
            None => Ok(None),
        }
    }

    /// List all saved chat sessions, most recently updated first
    pub fn list_sessions(&self) -> Result<Vec<StoredSession>> {
        let conn = self.connection()?;

        let mut stmt = conn
            .prepare(
                "SELECT s.persona_id, p.name, s.created_at, s.updated_at, s.turns
                FROM chat_sessions s
                LEFT JOIN personas p ON p.id = s.persona_id
                ORDER BY s.updated_at DESC",
            )
            .context("Failed to prepare statement")
            .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

        let sessions_iter = stmt
            .query_map([], |row| {
                let persona_id: String = row.get(0)?;
                let persona_name: Option<String> = row.get(1)?;
                let created_at_str: String = row.get(2)?;
                let updated_at_str: String = row.get(3)?;
                let turns_json: String = row.get(4)?;

                let turn_count = serde_json::from_str::<serde_json::Value>(&turns_json)
                    .ok()
                    .and_then(|val| val.as_array().map(|a| a.len()))
                    .unwrap_or(0);

                Ok(StoredSession {
                    persona_name: persona_name.unwrap_or_else(|| persona_id.clone()),
                    persona_id,
                    created_at: parse_timestamp(&created_at_str),
                    updated_at: parse_timestamp(&updated_at_str),
                    turn_count,
                })
            })
            .context("Failed to query sessions")
            .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

        Ok(sessions_iter.flatten().collect())
    }

    /// Delete the saved chat session of a persona
    ///
    /// Returns whether a session existed. Deleting a missing session is not an error.
    pub fn delete_session(&self, persona_id: &str) -> Result<bool> {
        let conn = self.connection()?;

        let removed = conn
            .execute(
                "DELETE FROM chat_sessions WHERE persona_id = ?",
                params![persona_id],
            )
            .context("Failed to delete chat session")
            .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

        Ok(removed > 0)
    }
}

/// Parse an RFC 3339 timestamp stored by this crate, falling back to now
pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Turn, TurnStatus};
    use std::thread::sleep;
    use tempfile::tempdir;

    /// Returns both the storage and the `TempDir` so the directory outlives the test.
    fn create_test_storage() -> (SqliteStorage, tempfile::TempDir) {
        let dir = tempdir().expect("failed to create tempdir");
        let storage = SqliteStorage::new(dir.path()).expect("failed to create storage");
        (storage, dir)
    }

    #[test]
    fn test_init_creates_all_tables() {
        let (storage, _dir) = create_test_storage();
        let conn = storage.connection().expect("open connection");
        for table in ["personas", "sources", "kb_partitions", "chunks", "chat_sessions"] {
            let count: i64 = conn
                .query_row(
                    "SELECT count(*) FROM sqlite_master WHERE type='table' AND name=?",
                    params![table],
                    |r| r.get(0),
                )
                .expect("query row");
            assert_eq!(count, 1, "missing table {}", table);
        }
    }

    #[test]
    fn test_new_creates_nested_data_dir() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("a").join("b");
        let storage = SqliteStorage::new(&data_dir).unwrap();
        assert_eq!(storage.db_path(), data_dir.join(DATABASE_FILE));
        assert!(data_dir.exists());
    }

    #[test]
    fn test_init_is_idempotent() {
        let (storage, dir) = create_test_storage();
        drop(storage);
        assert!(SqliteStorage::new(dir.path()).is_ok());
    }

    #[test]
    fn test_save_and_load_session_roundtrip_with_markers() {
        let (storage, _dir) = create_test_storage();
        let turns = vec![
            Turn::user("who are you?"),
            Turn::assistant("I'm Pickle R", TurnStatus::Incomplete),
            Turn::user("again"),
            Turn::assistant("", TurnStatus::Failed),
        ];

        storage.save_session("rick", &turns).unwrap();
        let loaded = storage.load_session("rick").unwrap().expect("session");

        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded[1].status, TurnStatus::Incomplete);
        assert_eq!(loaded[1].content, "I'm Pickle R");
        assert_eq!(loaded[3].status, TurnStatus::Failed);
    }

    #[test]
    fn test_load_session_missing_returns_none() {
        let (storage, _dir) = create_test_storage();
        assert!(storage.load_session("nobody").unwrap().is_none());
    }

    #[test]
    fn test_save_session_overwrites_and_preserves_created_at() {
        let (storage, _dir) = create_test_storage();
        storage.save_session("rick", &[Turn::user("a")]).unwrap();
        let first = storage.list_sessions().unwrap().remove(0);

        sleep(Duration::from_millis(10));
        storage
            .save_session("rick", &[Turn::user("a"), Turn::user("b")])
            .unwrap();
        let sessions = storage.list_sessions().unwrap();

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].turn_count, 2);
        assert_eq!(sessions[0].created_at, first.created_at);
        assert!(sessions[0].updated_at > first.updated_at);
    }

    #[test]
    fn test_list_sessions_ordered_by_updated_at() {
        let (storage, _dir) = create_test_storage();
        storage.save_session("morty", &[Turn::user("x")]).unwrap();
        sleep(Duration::from_millis(10));
        storage.save_session("rick", &[Turn::user("y")]).unwrap();

        let sessions = storage.list_sessions().unwrap();
        assert_eq!(sessions[0].persona_id, "rick");
        assert_eq!(sessions[1].persona_id, "morty");
        // No persona row: the id doubles as the display name.
        assert_eq!(sessions[0].persona_name, "rick");
    }

    #[test]
    fn test_delete_session_is_idempotent() {
        let (storage, _dir) = create_test_storage();
        storage.save_session("rick", &[Turn::user("x")]).unwrap();
        assert!(storage.delete_session("rick").unwrap());
        assert!(!storage.delete_session("rick").unwrap());
        assert!(storage.load_session("rick").unwrap().is_none());
    }
}
