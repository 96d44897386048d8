//! Chat history persistence
//!
//! Turns are stored per session and read back oldest-first to seed prompt
//! construction. Writes go through [`HistoryWriter`], a single background
//! worker, so the request path never waits on them and each session's turns
//! land in the order requests were enqueued.

mod cached;
mod memory;
mod sqlite;
mod writer;

pub use cached::CachedHistory;
pub use memory::MemoryHistoryStore;
pub use sqlite::SqliteHistoryStore;
pub use writer::{Exchange, HistoryWriter, WriterStats};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{HistoryBackend, HistoryConfig};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Ai,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Human => "human",
            Role::Ai => "ai",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "human" => Ok(Role::Human),
            "ai" => Ok(Role::Ai),
            other => Err(Error::History(format!("unknown role '{}'", other))),
        }
    }
}

/// A stored utterance. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// A turn waiting to be written; the store assigns the timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTurn {
    pub role: Role,
    pub message: String,
}

impl NewTurn {
    pub fn human(message: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            message: message.into(),
        }
    }

    pub fn ai(message: impl Into<String>) -> Self {
        Self {
            role: Role::Ai,
            message: message.into(),
        }
    }
}

/// Per-session record store
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Write all turns for a session in one atomic step, in slice order.
    async fn append(&self, session: &str, turns: &[NewTurn]) -> Result<()>;

    /// The most recent `limit` turns, oldest first. Unknown sessions yield an empty list.
    async fn fetch(&self, session: &str, limit: usize) -> Result<Vec<Turn>>;

    /// Keep only the newest `keep` turns. Returns the number removed.
    async fn prune(&self, session: &str, keep: usize) -> Result<usize>;

    /// Session ids with at least one stored turn
    async fn sessions(&self) -> Result<Vec<String>>;

    fn backend_name(&self) -> &'static str;
}

/// Server timestamp for the next turn, never earlier than the session's last one.
pub(crate) fn next_timestamp(last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match last {
        Some(prev) if prev > now => prev,
        _ => now,
    }
}

/// Open the configured backend
pub fn create_store(config: &HistoryConfig) -> Result<Arc<dyn HistoryStore>> {
    match config.backend {
        HistoryBackend::Sqlite => Ok(Arc::new(SqliteHistoryStore::open(&config.path)?)),
        HistoryBackend::Memory => Ok(Arc::new(MemoryHistoryStore::new())),
    }
}
