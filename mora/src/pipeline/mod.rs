//! Context assembly and answer generation
//!
//! ```text
//! Received → CacheCheck ─┬─ CacheHit → Responding ───────────────────────────────┬→ Done
//!                        └─ CacheMiss → HistoryFetch → QuestionRewrite →         │
//!                           Retrieval → AnswerCompose → CacheWrite → Responding ─┘
//! ```

mod answer;
mod prompt;
mod stage;

pub use answer::{AnswerPipeline, PipelineSettings};
pub use prompt::word_count;
pub use stage::Stage;

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::session::SessionKey;

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub input: String,
    pub session: SessionKey,
}

impl ChatRequest {
    pub fn new(input: impl Into<String>, session: SessionKey) -> Self {
        Self {
            input: input.into(),
            session,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    /// History-aware rewrite plus retrieval
    Full,
    /// Direct short answer without history or retrieval
    Fast,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatAnswer {
    pub response: String,
    pub cached: bool,
    pub mode: AnswerMode,
    /// Time spent generating; absent on cache hits
    pub rag_time: Option<Duration>,
    pub total_time: Duration,
}

/// A request that failed after the cache check. Nothing was cached or recorded.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineFailure {
    pub message: String,
    pub elapsed: Duration,
}
