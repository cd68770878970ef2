// Main entry point for the medicine label analysis service

use medilens_vision::{
    core::Config,
    orchestration::AnalysisPipeline,
    server::{router, AppState},
    services::ocr::is_ocr_available,
    utils::Metrics,
};

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration; a missing GEMINI_API_KEY stops startup here
    let config = Config::new().context("Failed to load configuration")?;

    // Initialize logging
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "medilens_vision={},tower_http=info",
        match config.log_level() {
            tracing::Level::TRACE => "trace",
            tracing::Level::DEBUG => "debug",
            tracing::Level::INFO => "info",
            tracing::Level::WARN => "warn",
            tracing::Level::ERROR => "error",
        }
    ));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== MEDILENS VISION API ===");
    info!(
        "Config: OCR={:?} ({}) Model={} Retries={} Upload limit={}KB",
        config.ocr.backend,
        config.ocr.command,
        config.gemini_model(),
        config.api.max_retries,
        config.server.max_upload_bytes / 1024
    );

    if !is_ocr_available(&config.ocr.command).await {
        warn!(
            "OCR command `{}` did not answer --version; /analyze will fail until it is installed",
            config.ocr.command
        );
    }

    // Initialize metrics
    let metrics = Metrics::new();

    info!("Initializing analysis pipeline...");
    let pipeline = Arc::new(
        AnalysisPipeline::new(&config, metrics.clone())
            .context("Failed to initialize Gemini client")?,
    );
    let state = AppState { pipeline, metrics };

    let app = router(state, &config.server);

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(70));
    info!("Server starting on http://{}", addr);
    info!("{}", "-".repeat(70));
    info!("Endpoints:");
    info!("  GET  /         - Root endpoint");
    info!("  GET  /health   - Health check");
    info!("  GET  /metrics  - Prometheus metrics");
    info!("  GET  /stats    - Detailed statistics");
    info!("  POST /analyze  - Analyze a medicine label (multipart/form-data, field \"file\")");
    info!("{}", "=".repeat(70));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
