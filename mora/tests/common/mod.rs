//! Shared fakes for pipeline and API tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mora::cache::{CacheKey, MemoryStore, ResponseCache, ResponseStore};
use mora::history::{HistoryWriter, MemoryHistoryStore};
use mora::llm::{ChatMessage, ChatModel, ChatRole, GenerationOptions};
use mora::pipeline::{AnswerPipeline, PipelineSettings};
use mora::retrieval::{Passage, Retriever};
use mora::{Error, Result};
use parking_lot::Mutex;

/// Answers "Answer to: {last user message}" and records every call.
/// Rewrite calls (system prompt starting with "Given the previous") return
/// "standalone: {input}".
pub struct ScriptedChat {
    pub calls: Mutex<Vec<Vec<ChatMessage>>>,
    pub delay: Option<Duration>,
    pub fail_with: Option<u16>,
}

impl ScriptedChat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            delay: None,
            fail_with: None,
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            delay: Some(delay),
            fail_with: None,
        })
    }

    pub fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            delay: None,
            fail_with: Some(status),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn last_call(&self) -> Vec<ChatMessage> {
        self.calls.lock().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        _options: &GenerationOptions,
    ) -> Result<String> {
        self.calls.lock().push(messages.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(status) = self.fail_with {
            return Err(Error::UpstreamStatus {
                service: "test",
                status,
                body: "model unavailable".into(),
            });
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let is_rewrite = messages
            .first()
            .map(|m| m.role == ChatRole::System && m.content.starts_with("Given the previous"))
            .unwrap_or(false);

        if is_rewrite {
            Ok(format!("standalone: {}", last_user))
        } else {
            Ok(format!("  Answer to: {}\n", last_user))
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }

    fn provider_name(&self) -> &'static str {
        "test"
    }
}

/// Returns fixed passages and records the queries it saw
pub struct FixedRetriever {
    pub passages: Vec<Passage>,
    pub queries: Mutex<Vec<String>>,
}

impl FixedRetriever {
    pub fn new(texts: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            passages: texts
                .iter()
                .map(|t| Passage {
                    text: t.to_string(),
                    source: "fixture.md".to_string(),
                    score: 1.0,
                })
                .collect(),
            queries: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Retriever for FixedRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Passage>> {
        self.queries.lock().push(query.to_string());
        Ok(self.passages.iter().take(k).cloned().collect())
    }
}

/// A networked store that fails every call
pub struct DownStore;

#[async_trait]
impl ResponseStore for DownStore {
    async fn get(&self, _key: &CacheKey) -> Result<Option<String>> {
        Err(Error::Cache("connection refused".into()))
    }

    async fn set(&self, _key: &CacheKey, _value: &str, _ttl: Duration) -> Result<()> {
        Err(Error::Cache("connection refused".into()))
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

pub struct Harness {
    pub pipeline: Arc<AnswerPipeline>,
    pub history: Arc<MemoryHistoryStore>,
    pub writer: Arc<HistoryWriter>,
    pub llm: Arc<ScriptedChat>,
}

pub fn local_cache() -> Arc<ResponseCache> {
    Arc::new(ResponseCache::local(
        MemoryStore::new(1000),
        Duration::from_secs(3600),
    ))
}

pub fn harness_with(
    llm: Arc<ScriptedChat>,
    cache: Arc<ResponseCache>,
    retriever: Option<Arc<dyn Retriever>>,
    settings: PipelineSettings,
) -> Harness {
    let history = Arc::new(MemoryHistoryStore::new());
    let writer = Arc::new(HistoryWriter::spawn(history.clone(), 64, 0));
    let pipeline = Arc::new(AnswerPipeline::new(
        cache,
        history.clone(),
        writer.clone(),
        llm.clone(),
        retriever,
        settings,
    ));
    Harness {
        pipeline,
        history,
        writer,
        llm,
    }
}

pub fn harness() -> Harness {
    harness_with(
        ScriptedChat::new(),
        local_cache(),
        None,
        PipelineSettings::default(),
    )
}
