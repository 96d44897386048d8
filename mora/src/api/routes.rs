use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::server::AppState;
use super::{format_secs, ApiError};
use crate::llm::{ChatMessage, GenerationOptions};
use crate::pipeline::{AnswerMode, ChatAnswer, ChatRequest};
use crate::session::SessionKey;

const MISSING_FIELDS: &str = "Missing 'input' or 'session_id' in request";

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<AnswerMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rag_time: Option<String>,
    pub total_time: String,
}

impl ChatResponse {
    fn from_answer(answer: ChatAnswer, include_mode: bool) -> Self {
        Self {
            response: answer.response,
            cached: answer.cached,
            mode: include_mode.then_some(answer.mode),
            rag_time: answer.rag_time.map(format_secs),
            total_time: format_secs(answer.total_time),
        }
    }
}

fn parse_request(payload: Result<Json<ChatBody>, JsonRejection>) -> Result<ChatRequest, ApiError> {
    let Json(body) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected chat body");
        ApiError::BadRequest(MISSING_FIELDS.to_string())
    })?;

    let input = body.input.filter(|s| !s.trim().is_empty());
    let session_id = body.session_id.filter(|s| !s.trim().is_empty());
    match (input, session_id) {
        (Some(input), Some(session_id)) => Ok(ChatRequest::new(
            input,
            SessionKey::new(body.user_id.as_deref(), &session_id),
        )),
        _ => Err(ApiError::BadRequest(MISSING_FIELDS.to_string())),
    }
}

/// POST /chat
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let request = parse_request(payload)?;
    let answer = state
        .pipeline
        .answer(&request)
        .await
        .map_err(ApiError::Pipeline)?;
    Ok(Json(ChatResponse::from_answer(answer, false)))
}

/// POST /chat/fast
pub async fn chat_fast(
    State(state): State<AppState>,
    payload: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let request = parse_request(payload)?;
    let answer = state
        .pipeline
        .answer_fast(&request)
        .await
        .map_err(ApiError::Pipeline)?;
    Ok(Json(ChatResponse::from_answer(answer, true)))
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: String,
    pub llm_status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_error: Option<String>,
    pub llm_provider: &'static str,
    pub llm_model: String,
    pub retriever_status: &'static str,
    pub cache_enabled: bool,
    pub cache_type: &'static str,
    pub history_backend: &'static str,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let pipeline = &state.pipeline;
    let llm = pipeline.llm();

    let llm_error = match &state.llm_error {
        Some(reason) => Some(reason.to_string()),
        None if state.health_llm_check => {
            let ping = llm
                .generate(
                    &[ChatMessage::user("Hello")],
                    &GenerationOptions {
                        temperature: 0.0,
                        max_output_tokens: 8,
                    },
                )
                .await;
            ping.err().map(|e| e.to_string())
        }
        None => None,
    };

    let cache = pipeline.cache();
    Json(HealthReport {
        status: "healthy",
        service: "Mora Breast Care Assistant",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
        llm_status: if llm_error.is_some() {
            "error"
        } else {
            "connected"
        },
        llm_error,
        llm_provider: llm.provider_name(),
        llm_model: llm.model_name().to_string(),
        retriever_status: if pipeline.has_retriever() {
            "connected"
        } else {
            "not_available"
        },
        cache_enabled: cache.is_networked(),
        cache_type: cache.cache_type(),
        history_backend: state.history_backend,
    })
}

/// GET /metrics
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
