//! SQLite-backed history store

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use super::{next_timestamp, HistoryStore, NewTurn, Role, Turn};
use crate::{Error, Result};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS chat_messages (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id  TEXT NOT NULL,
        role        TEXT NOT NULL,
        message     TEXT NOT NULL,
        timestamp   INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_messages_session ON chat_messages(session_id, id);
"#;

/// One row per turn, keyed by session. Timestamps are stored as UTC microseconds.
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;

        // WAL mode + performance pragmas
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA temp_store=MEMORY;",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| Error::History(format!("invalid timestamp {}", micros)))
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn append(&self, session: &str, turns: &[NewTurn]) -> Result<()> {
        if turns.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let last: Option<i64> = tx
            .query_row(
                "SELECT timestamp FROM chat_messages WHERE session_id = ?1 ORDER BY id DESC LIMIT 1",
                params![session],
                |row| row.get(0),
            )
            .optional()?;
        let mut last = last.map(from_micros).transpose()?;

        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO chat_messages (session_id, role, message, timestamp) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for turn in turns {
                let ts = next_timestamp(last);
                stmt.execute(params![
                    session,
                    turn.role.as_str(),
                    turn.message,
                    ts.timestamp_micros()
                ])?;
                last = Some(ts);
            }
        }

        tx.commit()?;
        Ok(())
    }

    async fn fetch(&self, session: &str, limit: usize) -> Result<Vec<Turn>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT role, message, timestamp FROM chat_messages
             WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![session, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut turns = Vec::new();
        for row in rows {
            let (role, message, micros) = row?;
            turns.push(Turn {
                role: role.parse::<Role>()?,
                message,
                timestamp: from_micros(micros)?,
            });
        }
        turns.reverse();
        Ok(turns)
    }

    async fn prune(&self, session: &str, keep: usize) -> Result<usize> {
        let conn = self.conn.lock().await;
        let removed = conn.execute(
            "DELETE FROM chat_messages WHERE session_id = ?1 AND id NOT IN (
                 SELECT id FROM chat_messages WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2
             )",
            params![session, keep as i64],
        )?;
        Ok(removed)
    }

    async fn sessions(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT DISTINCT session_id FROM chat_messages ORDER BY session_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
