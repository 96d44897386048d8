use std::future::Future;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::CorsConfig;
use crate::pipeline::AnswerPipeline;
use crate::Result;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AnswerPipeline>,
    /// Why the configured model could not be built, if it could not
    pub llm_error: Option<Arc<str>>,
    pub history_backend: &'static str,
    pub health_llm_check: bool,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(pipeline: Arc<AnswerPipeline>, history_backend: &'static str) -> Self {
        Self {
            pipeline,
            llm_error: None,
            history_backend,
            health_llm_check: false,
            metrics: None,
        }
    }

    pub fn with_llm_error(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.llm_error = Some(reason.into());
        self
    }

    pub fn with_health_llm_check(mut self, enabled: bool) -> Self {
        self.health_llm_check = enabled;
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

pub struct ApiServer {
    state: AppState,
    cors_config: CorsConfig,
    max_body_size: usize,
}

impl ApiServer {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            cors_config: CorsConfig::default(),
            max_body_size: 1024 * 1024,
        }
    }

    pub fn with_cors(mut self, cors_config: CorsConfig) -> Self {
        self.cors_config = cors_config;
        self
    }

    pub fn with_body_limit(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn router(&self) -> Router {
        let cors = build_cors_layer(&self.cors_config);

        Router::new()
            .route("/chat", post(crate::api::routes::chat))
            .route("/chat/fast", post(crate::api::routes::chat_fast))
            .route("/health", get(crate::api::routes::health))
            .route("/metrics", get(crate::api::routes::metrics))
            .with_state(self.state.clone())
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(self.max_body_size))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    pub async fn serve<F>(self, addr: &str, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Chat API listening on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

/// Build CORS layer from configuration
pub fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    if !config.enabled {
        return CorsLayer::new();
    }

    let origins: Vec<HeaderValue> = config
        .origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| o.parse().ok())
        .collect();

    let has_wildcard = config.origins.iter().any(|o| o == "*");

    let cors = if has_wildcard {
        CorsLayer::new().allow_origin(tower_http::cors::Any)
    } else if origins.is_empty() {
        CorsLayer::new()
    } else {
        CorsLayer::new().allow_origin(origins)
    };

    cors.allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}
