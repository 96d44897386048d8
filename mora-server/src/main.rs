use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use mora::api::{build_cors_layer, ApiServer, AppState};
use mora::cache::ResponseCache;
use mora::config::{Config, ObservabilityConfig};
use mora::history::{create_store, CachedHistory, HistoryStore, HistoryWriter};
use mora::llm::{create_chat_model, ChatModel, UnavailableChat};
use mora::pipeline::{AnswerPipeline, PipelineSettings};
use mora_scan::{ScanConfig, ScanState};
use serde::Deserialize;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "mora-server")]
#[command(about = "Mora breast care assistant server")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "mora.toml", env = "MORA_CONFIG")]
    config: String,

    /// Host to bind to (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,
}

/// The `[scan]` table lives beside the chat config in the same file.
#[derive(Debug, Default, Deserialize)]
struct ScanSection {
    #[serde(default)]
    scan: Option<ScanConfig>,
}

fn init_logging(config: &ObservabilityConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| config.log_format.clone());

    let registry = tracing_subscriber::registry().with(filter);
    if format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn bind_addr(config: &Config, args: &Args) -> String {
    let (default_host, default_port) = config
        .server
        .bind_addr
        .rsplit_once(':')
        .unwrap_or((config.server.bind_addr.as_str(), "5003"));
    let host = args.host.as_deref().unwrap_or(default_host);
    match args.port {
        Some(port) => format!("{}:{}", host, port),
        None => format!("{}:{}", host, default_port),
    }
}

fn load_scan_config(path: &Path) -> Result<Option<ScanConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let section: ScanSection = toml::from_str(&std::fs::read_to_string(path)?)?;
    Ok(section.scan.filter(|s| s.enabled))
}

fn install_metrics(config: &ObservabilityConfig) -> Option<PrometheusHandle> {
    if !config.metrics_enabled {
        return None;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install Prometheus recorder, /metrics disabled");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = Path::new(&args.config);

    let config = Config::load_or_create(config_path)?;
    init_logging(&config.observability);
    config.ensure_dirs()?;

    let addr = bind_addr(&config, &args);
    tracing::info!("Starting Mora server on {}", addr);
    tracing::info!("Config file: {}", args.config);

    let metrics = install_metrics(&config.observability);

    // Stores
    let cache = Arc::new(ResponseCache::connect(&config.cache).await);
    let store = create_store(&config.history)?;
    let history_backend = store.backend_name();
    let history: Arc<dyn HistoryStore> =
        Arc::new(CachedHistory::new(store, config.history.read_cache_ttl()));
    let writer = Arc::new(HistoryWriter::spawn(
        history.clone(),
        config.history.queue_capacity,
        config.history.max_turns_per_session,
    ));

    // Models
    let (llm, llm_error): (Arc<dyn ChatModel>, Option<String>) =
        match create_chat_model(&config.llm) {
            Ok(model) => (model, None),
            Err(e) => {
                tracing::error!(error = %e, "Chat model unavailable, requests will fail");
                let reason = e.to_string();
                (Arc::new(UnavailableChat::new(reason.clone())), Some(reason))
            }
        };
    let retriever = mora::retrieval::open_retriever(&config).await;

    let pipeline = Arc::new(AnswerPipeline::new(
        cache,
        history,
        writer.clone(),
        llm,
        retriever,
        PipelineSettings::from_config(&config),
    ));

    let mut state = AppState::new(pipeline, history_backend)
        .with_health_llm_check(config.server.health_llm_check);
    if let Some(reason) = llm_error {
        state = state.with_llm_error(reason);
    }
    if let Some(handle) = metrics {
        state = state.with_metrics(handle);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let wait_for = |mut rx: watch::Receiver<bool>| async move {
        let _ = rx.wait_for(|stop| *stop).await;
    };

    let scan_task = match load_scan_config(config_path)? {
        Some(scan) => {
            let router = mora_scan::router(ScanState::from_config(&scan), scan.max_body_size)
                .layer(build_cors_layer(&config.server.cors));
            let listener = tokio::net::TcpListener::bind(&scan.bind_addr).await?;
            tracing::info!("Scan API listening on {}", scan.bind_addr);
            let shutdown = wait_for(shutdown_rx.clone());
            Some(tokio::spawn(async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(shutdown)
                    .await
            }))
        }
        None => None,
    };

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
        }
        let _ = shutdown_tx.send(true);
    });

    let server = ApiServer::new(state)
        .with_cors(config.server.cors.clone())
        .with_body_limit(config.server.max_body_size);
    server.serve(&addr, wait_for(shutdown_rx)).await?;

    if let Some(task) = scan_task {
        task.await??;
    }

    writer.shutdown().await;
    tracing::info!("History writer drained, exiting");

    Ok(())
}
