//! Scan HTTP API
//!
//! | Method | Path | Auth |
//! |---|---|---|
//! | GET | `/` | no |
//! | GET | `/health` | no |
//! | POST | `/api/upload-image` | bearer |
//! | POST | `/api/process-image` | bearer |
//! | GET | `/api/status/:processing_id` | bearer |

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::analysis::{Analyzer, MockAnalyzer};
use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::frame::{decode_image, Frame};
use crate::jobs::{JobRecord, JobStatus, JobTracker, ScanReport};
use crate::pipeline::{default_filename, ScanPipeline};

/// Routes that do not require authentication
const AUTH_WHITELIST: &[&str] = &["/", "/health"];

/// Bearer tokens accepted by the API.
#[derive(Debug, Default)]
pub struct TokenAuth {
    tokens: HashSet<String>,
}

impl TokenAuth {
    /// An empty list accepts any non-empty token.
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        Self {
            tokens: tokens.into_iter().filter(|t| !t.is_empty()).collect(),
        }
    }

    pub fn accepts(&self, token: &str) -> bool {
        !token.is_empty() && (self.tokens.is_empty() || self.tokens.contains(token))
    }
}

#[derive(Clone)]
pub struct ScanState {
    pub pipeline: Option<Arc<ScanPipeline>>,
    pub analyzer: Arc<dyn Analyzer>,
    pub jobs: Arc<JobTracker>,
    pub auth: Arc<TokenAuth>,
}

impl ScanState {
    pub fn new(
        pipeline: Option<Arc<ScanPipeline>>,
        analyzer: Arc<dyn Analyzer>,
        jobs: Arc<JobTracker>,
        auth: TokenAuth,
    ) -> Self {
        Self {
            pipeline,
            analyzer,
            jobs,
            auth: Arc::new(auth),
        }
    }

    /// Build from config. A pipeline that cannot be built (missing key,
    /// bad storage config) leaves the API up with image routes answering 503.
    pub fn from_config(config: &ScanConfig) -> Self {
        let pipeline = match ScanPipeline::from_config(config) {
            Ok(p) => Some(Arc::new(p)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to initialize scan pipeline");
                None
            }
        };
        Self::new(
            pipeline,
            Arc::new(MockAnalyzer::new()),
            Arc::new(JobTracker::new(config.max_jobs)),
            TokenAuth::new(config.api_tokens.iter().cloned()),
        )
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    BadRequest(String),
    NotFound(String),
    Unavailable(String),
    Internal(String),
}

impl From<ScanError> for ApiError {
    fn from(e: ScanError) -> Self {
        match e {
            e if e.is_client_error() => ApiError::BadRequest(e.to_string()),
            e @ ScanError::Busy(_) => ApiError::Unavailable(e.to_string()),
            e => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Invalid authentication credentials".to_string(),
            ),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}

pub async fn auth_middleware(
    State(auth): State<Arc<TokenAuth>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if AUTH_WHITELIST.contains(&request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    match token {
        Some(t) if auth.accepts(t) => Ok(next.run(request).await),
        _ => Err(ApiError::Unauthorized),
    }
}

#[derive(Debug, Deserialize)]
pub struct ImageRequest {
    /// Base64 image, optionally as a `data:` URL
    pub image: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProcessingStatus {
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ScanReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn require_pipeline(state: &ScanState) -> Result<Arc<ScanPipeline>, ApiError> {
    state.pipeline.clone().ok_or_else(|| {
        ApiError::Unavailable("Image processing pipeline not available".to_string())
    })
}

fn parse_body(
    payload: Result<Json<ImageRequest>, JsonRejection>,
) -> Result<ImageRequest, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

/// Base64 (or data URL) to frame; decoding runs off the async workers.
async fn decode_payload(image: String) -> Result<Frame, ScanError> {
    let encoded = match image.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data.to_string(),
        _ => image,
    };
    tokio::task::spawn_blocking(move || {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ScanError::InvalidBase64(e.to_string()))?;
        decode_image(&bytes)
    })
    .await?
}

/// GET /
async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({"message": "Breast Scan AI Backend is running"}))
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: String,
    pub pipeline_ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_backend: Option<&'static str>,
    pub analyzer: &'static str,
    pub tracked_jobs: usize,
}

/// GET /health
async fn health(State(state): State<ScanState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "healthy",
        timestamp: chrono::Utc::now().to_rfc3339(),
        pipeline_ready: state.pipeline.is_some(),
        upload_backend: state.pipeline.as_ref().map(|p| p.upload_backend()),
        analyzer: state.analyzer.name(),
        tracked_jobs: state.jobs.len(),
    })
}

/// POST /api/upload-image
async fn upload_image(
    State(state): State<ScanState>,
    payload: Result<Json<ImageRequest>, JsonRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let pipeline = require_pipeline(&state)?;
    let request = parse_body(payload)?;
    let frame = decode_payload(request.image).await?;

    let filename = default_filename();
    let processing_id = state.jobs.create(request.metadata)?;
    tracing::info!(job = %processing_id, "Image upload accepted");

    tokio::spawn(run_job(
        state.clone(),
        pipeline,
        processing_id.clone(),
        frame,
        filename.clone(),
    ));

    Ok(Json(UploadResponse {
        success: true,
        filename: Some(format!("{}.enc", filename)),
        message: "Image uploaded successfully and processing started".to_string(),
        processing_id: Some(processing_id),
    }))
}

async fn run_job(
    state: ScanState,
    pipeline: Arc<ScanPipeline>,
    id: String,
    frame: Frame,
    filename: String,
) {
    state.jobs.set_progress(&id, JobStatus::Processing, 25);

    let analysis = match state.analyzer.analyze(&frame).await {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(job = %id, error = %e, "Analysis failed");
            state.jobs.fail(&id, e.to_string());
            return;
        }
    };
    state.jobs.set_progress(&id, JobStatus::Processing, 50);

    match pipeline.process_and_upload(frame, Some(filename)).await {
        Ok(upload) => {
            state.jobs.set_progress(&id, JobStatus::Processing, 75);
            state.jobs.complete(&id, ScanReport { analysis, upload });
            tracing::info!(job = %id, "Async processing completed");
        }
        Err(e) => {
            tracing::error!(job = %id, error = %e, "Async processing failed");
            state.jobs.fail(&id, e.to_string());
        }
    }
}

/// POST /api/process-image
///
/// Pipeline failures come back as a `failed` status, not an HTTP error.
async fn process_image(
    State(state): State<ScanState>,
    payload: Result<Json<ImageRequest>, JsonRejection>,
) -> Result<Json<ProcessingStatus>, ApiError> {
    let pipeline = require_pipeline(&state)?;
    let request = parse_body(payload)?;
    let frame = decode_payload(request.image).await?;

    let outcome = async {
        let analysis = state.analyzer.analyze(&frame).await?;
        let upload = pipeline.process_and_upload(frame, None).await?;
        Ok::<_, ScanError>(ScanReport { analysis, upload })
    }
    .await;

    Ok(Json(match outcome {
        Ok(report) => ProcessingStatus {
            status: JobStatus::Completed,
            progress: 100,
            result: Some(report),
            error: None,
        },
        Err(e) => {
            tracing::error!(error = %e, "Direct processing failed");
            ProcessingStatus {
                status: JobStatus::Failed,
                progress: 0,
                result: None,
                error: Some(e.to_string()),
            }
        }
    }))
}

/// GET /api/status/:processing_id
async fn status(
    State(state): State<ScanState>,
    Path(processing_id): Path<String>,
) -> Result<Json<JobRecord>, ApiError> {
    state
        .jobs
        .get(&processing_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Processing ID not found".to_string()))
}

pub fn router(state: ScanState, max_body_size: usize) -> Router {
    let auth = state.auth.clone();

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/upload-image", post(upload_image))
        .route("/api/process-image", post(process_image))
        .route("/api/status/:processing_id", get(status))
        .layer(middleware::from_fn_with_state(auth, auth_middleware))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_auth() {
        let open = TokenAuth::new(Vec::new());
        assert!(open.accepts("anything"));
        assert!(!open.accepts(""));

        let closed = TokenAuth::new(vec!["s3cret".to_string(), String::new()]);
        assert!(closed.accepts("s3cret"));
        assert!(!closed.accepts("guess"));
        assert!(!closed.accepts(""));
    }

    #[tokio::test]
    async fn test_decode_payload_accepts_data_url() {
        let png = crate::frame::encode_png(&crate::test_support::gradient(2, 2)).unwrap();
        let b64 = STANDARD.encode(&png);

        assert!(decode_payload(b64.clone()).await.is_ok());
        assert!(decode_payload(format!("data:image/png;base64,{}", b64))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_decode_payload_errors_are_client_errors() {
        let bad_b64 = decode_payload("!!!not base64".to_string()).await.unwrap_err();
        assert!(matches!(bad_b64, ScanError::InvalidBase64(_)));

        let not_image = decode_payload(STANDARD.encode(b"hello")).await.unwrap_err();
        assert!(matches!(not_image, ScanError::InvalidImage(_)));
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            ApiError::from(ScanError::InvalidImage("x".into())),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            ApiError::from(ScanError::Busy(3)),
            ApiError::Unavailable(_)
        ));
        assert!(matches!(
            ApiError::from(ScanError::Encode("x".into())),
            ApiError::Internal(_)
        ));
    }
}
