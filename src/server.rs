// HTTP surface: router, handlers, CORS and upload limits

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::core::config::{CorsOrigins, ServerConfig};
use crate::core::errors::AnalyzeError;
use crate::core::types::AnalyzeResponse;
use crate::orchestration::AnalysisPipeline;
use crate::utils::Metrics;

/// Multipart field carrying the label image
pub const IMAGE_FIELD: &str = "file";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AnalysisPipeline>,
    pub metrics: Metrics,
}

/// Build the application router with CORS, tracing and the upload limit applied.
pub fn router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/stats", get(stats_endpoint))
        .route("/analyze", post(analyze))
        .with_state(state)
        .layer(DefaultBodyLimit::max(server.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&server.cors))
}

fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match origins {
        CorsOrigins::Any => layer.allow_origin(Any),
        CorsOrigins::List(list) => {
            let origins: Vec<HeaderValue> = list
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!("Ignoring unusable CORS origin: {}", origin);
                        None
                    }
                })
                .collect();
            layer.allow_origin(origins)
        }
    }
}

async fn root(State(state): State<AppState>) -> &'static str {
    state.metrics.record_endpoint_request("/");
    "Welcome to the MediLens Vision API. POST a medicine label image to /analyze."
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.metrics.record_endpoint_request("/health");
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "ocr_engine": state.pipeline.ocr_engine_name(),
        "model": state.pipeline.gemini_model(),
    }))
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

/// Detailed statistics endpoint (JSON)
async fn stats_endpoint(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let snapshot = state.metrics.snapshot();
    serde_json::to_value(snapshot).map(Json).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to serialize metrics: {}", e),
        )
    })
}

/// Analyze a medicine label
///
/// # Request Format:
/// - multipart/form-data
/// - Field "file": the label image (any format the decoder understands)
///
/// # Response:
/// - 400 when the image is missing or undecodable
/// - 200 with `success: true` and the OCR lines + Gemini text
/// - 200 with `success: false` and an error message for any other failure
async fn analyze(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    state.metrics.record_endpoint_request("/analyze");
    let start_time = Instant::now();

    let bytes = match read_image_field(multipart).await {
        Ok(bytes) => bytes,
        Err(response) => {
            state.metrics.record_analysis_rejected();
            return response;
        }
    };

    info!("Received /analyze request ({} bytes)", bytes.len());

    match state.pipeline.analyze(bytes).await {
        Ok(outcome) => {
            state.metrics.record_analysis_success();
            info!(
                "Request completed in {:.2}s: {} OCR lines",
                start_time.elapsed().as_secs_f64(),
                outcome.ocr_text.len()
            );
            (StatusCode::OK, Json(AnalyzeResponse::from(outcome))).into_response()
        }
        Err(e) => {
            if e.status_code() == StatusCode::BAD_REQUEST {
                state.metrics.record_analysis_rejected();
                debug!("Rejected upload: {}", e);
            } else {
                state.metrics.record_analysis_failure();
                error!(
                    "Analysis failed after {:.2}s: {}",
                    start_time.elapsed().as_secs_f64(),
                    e
                );
            }
            e.into_response()
        }
    }
}

/// Pull the bytes of the `file` field out of the form.
///
/// Missing or empty field, or a body that is not multipart at all, counts as
/// "no image". Exceeding the upload limit is reported as 413.
async fn read_image_field(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Vec<u8>, Response> {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            debug!("Not a multipart request: {}", rejection);
            return Err(AnalyzeError::NoImage.into_response());
        }
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(AnalyzeError::NoImage.into_response()),
            Err(e) => return Err(multipart_error_response(e)),
        };

        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let data = field.bytes().await.map_err(multipart_error_response)?;
        debug!("Read field `{}` ({}, {} bytes)", IMAGE_FIELD, file_name, data.len());

        if data.is_empty() {
            return Err(AnalyzeError::NoImage.into_response());
        }
        return Ok(data.to_vec());
    }
}

fn multipart_error_response(e: axum::extract::multipart::MultipartError) -> Response {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!("Upload rejected: {}", e.body_text());
        let body = AnalyzeResponse::failure("Image exceeds the upload size limit");
        return (StatusCode::PAYLOAD_TOO_LARGE, Json(body)).into_response();
    }
    debug!("Malformed multipart body: {}", e.body_text());
    AnalyzeError::NoImage.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::OcrPage;
    use crate::services::analysis::GeminiClient;
    use crate::test_support::{
        encode_test_image, gemini_text_response, serve, spawn_gemini_stub, test_api_config,
        GeminiStub, StubOcr,
    };
    use reqwest::multipart::{Form, Part};
    use serde_json::{json, Value};

    const ANALYSIS: &str = "```json\n{\"medicineName\": \"Pan 40\", \"generic_name\": \"Pantoprazole\"}\n```";

    fn server_config(cors: CorsOrigins, max_upload_bytes: usize) -> ServerConfig {
        ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
            log_level: tracing::Level::INFO,
            max_upload_bytes,
            cors,
        }
    }

    async fn spawn_app(
        ocr: StubOcr,
        gemini_status: StatusCode,
        gemini_body: Value,
        server: ServerConfig,
    ) -> (String, GeminiStub) {
        let stub = spawn_gemini_stub(gemini_status, gemini_body).await;
        let metrics = Metrics::new();
        let gemini =
            GeminiClient::new(&test_api_config(&stub.base_url, 0), Some(metrics.clone())).unwrap();
        let pipeline = AnalysisPipeline::with_engine(Arc::new(ocr), gemini, metrics.clone());
        let state = AppState {
            pipeline: Arc::new(pipeline),
            metrics,
        };
        (serve(router(state, &server)).await, stub)
    }

    async fn spawn_default_app() -> (String, GeminiStub) {
        let ocr = StubOcr::returning(vec![OcrPage {
            rec_texts: vec!["PAN 40".into(), "Pantoprazole Gastro-resistant Tablets IP".into()],
            rec_scores: vec![0.98, 0.93],
        }]);
        spawn_app(
            ocr,
            StatusCode::OK,
            gemini_text_response(ANALYSIS),
            server_config(CorsOrigins::Any, 1024 * 1024),
        )
        .await
    }

    fn image_form(bytes: Vec<u8>) -> Form {
        Form::new().part(
            IMAGE_FIELD,
            Part::bytes(bytes)
                .file_name("scan.png")
                .mime_str("image/png")
                .unwrap(),
        )
    }

    async fn post_form(base_url: &str, form: Form) -> (StatusCode, Value) {
        let response = reqwest::Client::new()
            .post(format!("{}/analyze", base_url))
            .multipart(form)
            .send()
            .await
            .unwrap();
        let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
        (status, response.json().await.unwrap())
    }

    #[tokio::test]
    async fn test_root_welcome() {
        let (base_url, _stub) = spawn_default_app().await;
        let body = reqwest::get(format!("{}/", base_url))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("Welcome"));
    }

    #[tokio::test]
    async fn test_analyze_success() {
        let (base_url, stub) = spawn_default_app().await;
        let (status, body) = post_form(&base_url, image_form(encode_test_image(16, 8))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "success": true,
                "ocr_text": ["PAN 40", "Pantoprazole Gastro-resistant Tablets IP"],
                "gemini_analysis": ANALYSIS,
            })
        );

        let requests = stub.requests.lock();
        let prompt = requests[0].body["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap();
        assert!(prompt.contains("EXTRACTED TEXT: PAN 40 Pantoprazole Gastro-resistant Tablets IP"));
    }

    #[tokio::test]
    async fn test_missing_file_field() {
        let (base_url, stub) = spawn_default_app().await;
        let form = Form::new().text("note", "no image here");
        let (status, body) = post_form(&base_url, form).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"success": false, "error": "No image provided"}));
        assert!(stub.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_empty_file_and_non_multipart() {
        let (base_url, _stub) = spawn_default_app().await;

        let (status, body) = post_form(&base_url, image_form(Vec::new())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No image provided");

        let response = reqwest::Client::new()
            .post(format!("{}/analyze", base_url))
            .json(&json!({"file": "scan.jpg"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({"success": false, "error": "No image provided"}));
    }

    #[tokio::test]
    async fn test_invalid_image() {
        let (base_url, _stub) = spawn_default_app().await;
        let (status, body) = post_form(&base_url, image_form(b"this is not a jpeg".to_vec())).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"success": false, "error": "Invalid image file"}));
    }

    #[tokio::test]
    async fn test_upstream_failures_return_200() {
        let (base_url, _stub) = spawn_app(
            StubOcr::returning(vec![]),
            StatusCode::TOO_MANY_REQUESTS,
            json!({"error": {"code": 429, "message": "Resource has been exhausted"}}),
            server_config(CorsOrigins::Any, 1024 * 1024),
        )
        .await;
        let (status, body) = post_form(&base_url, image_form(encode_test_image(8, 8))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("429"));

        let (base_url, stub) = spawn_app(
            StubOcr::failing(),
            StatusCode::OK,
            gemini_text_response(ANALYSIS),
            server_config(CorsOrigins::Any, 1024 * 1024),
        )
        .await;
        let (status, body) = post_form(&base_url, image_form(encode_test_image(8, 8))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert!(!body["error"].as_str().unwrap().is_empty());
        assert!(stub.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_hides_api_key() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let closed = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let metrics = Metrics::new();
        let gemini = GeminiClient::new(&test_api_config(&closed, 0), None).unwrap();
        let ocr = StubOcr::returning(vec![OcrPage {
            rec_texts: vec!["CROCIN".into()],
            rec_scores: vec![0.9],
        }]);
        let state = AppState {
            pipeline: Arc::new(AnalysisPipeline::with_engine(Arc::new(ocr), gemini, metrics.clone())),
            metrics,
        };
        let base_url = serve(router(state, &server_config(CorsOrigins::Any, 1024 * 1024))).await;

        let (status, body) = post_form(&base_url, image_form(encode_test_image(8, 8))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        let error = body["error"].as_str().unwrap();
        assert!(!error.is_empty());
        assert!(!error.contains("test-key"), "{error}");
        assert!(!error.contains("key="), "{error}");
    }

    #[tokio::test]
    async fn test_upload_limit() {
        let (base_url, _stub) = spawn_app(
            StubOcr::returning(vec![]),
            StatusCode::OK,
            gemini_text_response(ANALYSIS),
            server_config(CorsOrigins::Any, 1024),
        )
        .await;
        let (status, body) = post_form(&base_url, image_form(vec![0u8; 8 * 1024])).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_cors_origins() {
        let (base_url, _stub) = spawn_default_app().await;
        let response = reqwest::Client::new()
            .get(format!("{}/", base_url))
            .header("Origin", "https://anywhere.example")
            .send()
            .await
            .unwrap();
        assert_eq!(response.headers()["access-control-allow-origin"], "*");

        let allowed = "https://medi-lens-pi.vercel.app".to_string();
        let (base_url, _stub) = spawn_app(
            StubOcr::returning(vec![]),
            StatusCode::OK,
            gemini_text_response(ANALYSIS),
            server_config(CorsOrigins::List(vec![allowed.clone()]), 1024 * 1024),
        )
        .await;
        let client = reqwest::Client::new();

        let response = client
            .get(format!("{}/", base_url))
            .header("Origin", &allowed)
            .send()
            .await
            .unwrap();
        assert_eq!(response.headers()["access-control-allow-origin"], allowed.as_str());

        let response = client
            .get(format!("{}/", base_url))
            .header("Origin", "https://evil.example")
            .send()
            .await
            .unwrap();
        assert!(response.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn test_metrics_and_stats() {
        let (base_url, _stub) = spawn_default_app().await;
        post_form(&base_url, image_form(encode_test_image(8, 8))).await;
        post_form(&base_url, image_form(b"junk".to_vec())).await;

        let prometheus = reqwest::get(format!("{}/metrics", base_url))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(prometheus.contains("analyses_total {outcome=\"success\"} 1"));
        assert!(prometheus.contains("analyses_total {outcome=\"rejected\"} 1"));

        let stats: Value = reqwest::get(format!("{}/stats", base_url))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["api_calls_success"], 1);

        let health: Value = reqwest::get(format!("{}/health", base_url))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["ocr_engine"], "stub");
    }
}
