use std::sync::Arc;
use std::time::{Duration, Instant};

use super::prompt;
use super::stage::{enter, Stage};
use super::{AnswerMode, ChatAnswer, ChatRequest, PipelineFailure};
use crate::cache::{derive_brief_key, derive_key, ResponseCache};
use crate::config::Config;
use crate::history::{Exchange, HistoryStore, HistoryWriter, Turn};
use crate::llm::{ChatModel, GenerationOptions};
use crate::retrieval::{Passage, Retriever};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub top_k: usize,
    pub history_limit: usize,
    pub fast_word_threshold: usize,
    pub request_timeout: Duration,
    pub persona: String,
    pub rewrite_instruction: String,
    pub generation: GenerationOptions,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            history_limit: config.history.fetch_limit,
            fast_word_threshold: config.pipeline.fast_word_threshold,
            request_timeout: config.pipeline.request_timeout(),
            persona: config.pipeline.persona.clone(),
            rewrite_instruction: config.pipeline.rewrite_instruction.clone(),
            generation: GenerationOptions {
                temperature: config.llm.temperature,
                max_output_tokens: config.llm.max_output_tokens,
            },
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct AnswerPipeline {
    cache: Arc<ResponseCache>,
    history: Arc<dyn HistoryStore>,
    writer: Arc<HistoryWriter>,
    llm: Arc<dyn ChatModel>,
    retriever: Option<Arc<dyn Retriever>>,
    settings: PipelineSettings,
}

impl AnswerPipeline {
    /// `history` is read on the request path; `writer` receives the appends.
    pub fn new(
        cache: Arc<ResponseCache>,
        history: Arc<dyn HistoryStore>,
        writer: Arc<HistoryWriter>,
        llm: Arc<dyn ChatModel>,
        retriever: Option<Arc<dyn Retriever>>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            cache,
            history,
            writer,
            llm,
            retriever,
            settings,
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn llm(&self) -> &Arc<dyn ChatModel> {
        &self.llm
    }

    pub fn has_retriever(&self) -> bool {
        self.retriever.is_some()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Full path: cache, then history-aware rewrite, retrieval and composition.
    pub async fn answer(
        &self,
        request: &ChatRequest,
    ) -> std::result::Result<ChatAnswer, PipelineFailure> {
        self.run(request, AnswerMode::Full).await
    }

    /// Short utterances skip history and retrieval; longer ones take the full path.
    pub async fn answer_fast(
        &self,
        request: &ChatRequest,
    ) -> std::result::Result<ChatAnswer, PipelineFailure> {
        let mode = if prompt::word_count(&request.input) < self.settings.fast_word_threshold {
            AnswerMode::Fast
        } else {
            AnswerMode::Full
        };
        self.run(request, mode).await
    }

    async fn run(
        &self,
        request: &ChatRequest,
        mode: AnswerMode,
    ) -> std::result::Result<ChatAnswer, PipelineFailure> {
        let started = Instant::now();
        let session = request.session.canonical();
        enter(Stage::Received, &session);

        enter(Stage::CacheCheck, &session);
        let full_key = derive_key(&session, &request.input);
        // Fast requests may reuse a full answer; full requests never see a brief one
        let (key, cached) = match mode {
            AnswerMode::Full => {
                let cached = self.cache.get(&full_key).await;
                (full_key, cached)
            }
            AnswerMode::Fast => {
                let brief_key = derive_brief_key(&session, &request.input);
                let cached = match self.cache.get(&brief_key).await {
                    Some(hit) => Some(hit),
                    None => self.cache.get(&full_key).await,
                };
                (brief_key, cached)
            }
        };
        if let Some(cached) = cached {
            enter(Stage::CacheHit, &session);
            self.writer
                .submit(Exchange::new(session.as_str(), &request.input, &cached));
            enter(Stage::Responding, &session);
            let total_time = started.elapsed();
            record("hit", mode, total_time);
            enter(Stage::Done, &session);
            return Ok(ChatAnswer {
                response: cached,
                cached: true,
                mode,
                rag_time: None,
                total_time,
            });
        }
        enter(Stage::CacheMiss, &session);

        let generation_started = Instant::now();
        let generated = match tokio::time::timeout(
            self.settings.request_timeout,
            self.generate(&session, &request.input, mode),
        )
        .await
        {
            Ok(res) => res,
            Err(_) => Err(Error::Timeout(self.settings.request_timeout)),
        };

        let response = match generated {
            Ok(text) => text,
            Err(e) => {
                let elapsed = started.elapsed();
                tracing::error!(session = %session, error = %e, "Chat processing failed");
                record("error", mode, elapsed);
                return Err(PipelineFailure {
                    message: e.to_string(),
                    elapsed,
                });
            }
        };
        let rag_time = generation_started.elapsed();

        enter(Stage::CacheWrite, &session);
        self.cache.set(&key, &response).await;
        self.writer
            .submit(Exchange::new(session.as_str(), &request.input, &response));

        enter(Stage::Responding, &session);
        let total_time = started.elapsed();
        record("miss", mode, total_time);
        enter(Stage::Done, &session);

        Ok(ChatAnswer {
            response,
            cached: false,
            mode,
            rag_time: Some(rag_time),
            total_time,
        })
    }

    async fn generate(&self, session: &str, input: &str, mode: AnswerMode) -> Result<String> {
        let text = match mode {
            AnswerMode::Fast => {
                enter(Stage::AnswerCompose, session);
                self.llm
                    .generate(&prompt::fast_messages(input), &self.settings.generation)
                    .await?
            }
            AnswerMode::Full => {
                enter(Stage::HistoryFetch, session);
                let history = self.fetch_history(session).await;

                enter(Stage::QuestionRewrite, session);
                let question = self.rewrite(&history, input).await?;

                enter(Stage::Retrieval, session);
                let passages = self.retrieve(&question).await?;

                enter(Stage::AnswerCompose, session);
                let messages = prompt::answer_messages(
                    &self.settings.persona,
                    &passages,
                    &history,
                    &question,
                );
                self.llm
                    .generate(&messages, &self.settings.generation)
                    .await?
            }
        };

        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Upstream("model returned an empty answer".into()));
        }
        Ok(text.to_string())
    }

    /// A failed read degrades to an empty history.
    async fn fetch_history(&self, session: &str) -> Vec<Turn> {
        match self.history.fetch(session, self.settings.history_limit).await {
            Ok(turns) => turns,
            Err(e) => {
                tracing::warn!(
                    session,
                    error = %e,
                    "History fetch failed, continuing without history"
                );
                metrics::counter!("mora_history_fetch_errors_total").increment(1);
                Vec::new()
            }
        }
    }

    async fn rewrite(&self, history: &[Turn], input: &str) -> Result<String> {
        if history.is_empty() {
            return Ok(input.to_string());
        }
        let messages = prompt::rewrite_messages(&self.settings.rewrite_instruction, history, input);
        let rewritten = self
            .llm
            .generate(&messages, &self.settings.generation)
            .await?;
        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            Ok(input.to_string())
        } else {
            tracing::debug!(original = input, rewritten, "Rewrote question");
            Ok(rewritten.to_string())
        }
    }

    async fn retrieve(&self, question: &str) -> Result<Vec<Passage>> {
        match &self.retriever {
            Some(retriever) => retriever.retrieve(question, self.settings.top_k).await,
            None => Ok(Vec::new()),
        }
    }
}

fn record(outcome: &'static str, mode: AnswerMode, elapsed: Duration) {
    let mode = match mode {
        AnswerMode::Full => "full",
        AnswerMode::Fast => "fast",
    };
    metrics::counter!("mora_chat_requests_total", "outcome" => outcome, "mode" => mode)
        .increment(1);
    metrics::histogram!("mora_chat_duration_seconds", "outcome" => outcome, "mode" => mode)
        .record(elapsed.as_secs_f64());
}
