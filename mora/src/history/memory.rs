//! In-process history store for tests and ephemeral deployments

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{next_timestamp, HistoryStore, NewTurn, Turn};
use crate::Result;

#[derive(Default)]
pub struct MemoryHistoryStore {
    sessions: RwLock<HashMap<String, Vec<Turn>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored turn for a session, oldest first
    pub fn all(&self, session: &str) -> Vec<Turn> {
        self.sessions
            .read()
            .get(session)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(&self, session: &str, turns: &[NewTurn]) -> Result<()> {
        let mut sessions = self.sessions.write();
        let log = sessions.entry(session.to_string()).or_default();
        for turn in turns {
            let timestamp = next_timestamp(log.last().map(|t| t.timestamp));
            log.push(Turn {
                role: turn.role,
                message: turn.message.clone(),
                timestamp,
            });
        }
        Ok(())
    }

    async fn fetch(&self, session: &str, limit: usize) -> Result<Vec<Turn>> {
        let sessions = self.sessions.read();
        Ok(sessions
            .get(session)
            .map(|log| log[log.len().saturating_sub(limit)..].to_vec())
            .unwrap_or_default())
    }

    async fn prune(&self, session: &str, keep: usize) -> Result<usize> {
        let mut sessions = self.sessions.write();
        let Some(log) = sessions.get_mut(session) else {
            return Ok(0);
        };
        let excess = log.len().saturating_sub(keep);
        log.drain(..excess);
        Ok(excess)
    }

    async fn sessions(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
