//! HTTP API: `/chat`, `/chat/fast`, `/health`, `/metrics`

pub mod routes;
pub mod server;

pub use server::{build_cors_layer, ApiServer, AppState};

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::pipeline::PipelineFailure;

/// Seconds with two decimals, e.g. `"0.42s"`
pub fn format_secs(d: Duration) -> String {
    format!("{:.2}s", d.as_secs_f64())
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Pipeline(PipelineFailure),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: message,
                    response_time: None,
                }),
            )
                .into_response(),
            ApiError::Pipeline(failure) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: format!("Chat processing failed: {}", failure.message),
                    response_time: Some(format_secs(failure.elapsed)),
                }),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_secs() {
        assert_eq!(format_secs(Duration::from_millis(420)), "0.42s");
        assert_eq!(format_secs(Duration::from_secs(3)), "3.00s");
    }
}
