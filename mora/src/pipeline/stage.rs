use std::fmt;

/// Per-request pipeline states, in the order a request can visit them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    CacheCheck,
    CacheHit,
    CacheMiss,
    HistoryFetch,
    QuestionRewrite,
    Retrieval,
    AnswerCompose,
    CacheWrite,
    Responding,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::CacheCheck => "cache_check",
            Stage::CacheHit => "cache_hit",
            Stage::CacheMiss => "cache_miss",
            Stage::HistoryFetch => "history_fetch",
            Stage::QuestionRewrite => "question_rewrite",
            Stage::Retrieval => "retrieval",
            Stage::AnswerCompose => "answer_compose",
            Stage::CacheWrite => "cache_write",
            Stage::Responding => "responding",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn enter(stage: Stage, session: &str) {
    tracing::debug!(stage = %stage, session, "Pipeline stage");
}
