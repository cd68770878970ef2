// Helpers shared by the tests: a local stand-in for the Gemini API and a
// scripted OCR engine.

use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::ApiConfig;
use crate::core::errors::{OcrError, OcrResult};
use crate::core::types::OcrPage;
use crate::services::ocr::OcrEngine;

#[derive(Debug, Clone)]
pub(crate) struct CapturedRequest {
    pub model_action: String,
    pub api_key_header: Option<String>,
    pub query_key: Option<String>,
    pub body: Value,
}

pub(crate) struct GeminiStub {
    pub base_url: String,
    pub requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

#[derive(Clone)]
struct StubState {
    status: StatusCode,
    response: Value,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

/// Bind `router` on an ephemeral localhost port and return its base URL.
pub(crate) async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Start a fake `generateContent` endpoint answering every call with `response`.
pub(crate) async fn spawn_gemini_stub(status: StatusCode, response: Value) -> GeminiStub {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let state = StubState {
        status,
        response,
        requests: Arc::clone(&requests),
    };

    let router = Router::new()
        .route("/v1beta/models/{model_action}", post(generate_content))
        .with_state(state);

    GeminiStub {
        base_url: serve(router).await,
        requests,
    }
}

async fn generate_content(
    State(state): State<StubState>,
    Path(model_action): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.requests.lock().push(CapturedRequest {
        model_action,
        api_key_header: headers
            .get("x-goog-api-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        query_key: query.get("key").cloned(),
        body,
    });
    (state.status, Json(state.response.clone()))
}

/// A successful Gemini response carrying `text`.
pub(crate) fn gemini_text_response(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 34}
    })
}

pub(crate) fn test_api_config(base_url: &str, max_retries: u32) -> ApiConfig {
    ApiConfig {
        api_key: "test-key".to_string(),
        model: "gemini-2.5-flash-lite".to_string(),
        base_url: base_url.to_string(),
        timeout: Duration::from_secs(5),
        max_retries,
    }
}

/// PNG-encoded RGB gradient of the given size.
pub(crate) fn encode_test_image(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 12 % 256) as u8, (y * 25 % 256) as u8, 128])
    });
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

/// What the stub OCR engine observed on disk.
#[derive(Debug, Clone)]
pub(crate) struct SeenImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub grayscale: bool,
}

/// OCR engine returning canned pages (or a failure) and recording its input.
pub(crate) struct StubOcr {
    pages: Vec<OcrPage>,
    fail: bool,
    seen: Mutex<Vec<SeenImage>>,
}

impl StubOcr {
    pub fn returning(pages: Vec<OcrPage>) -> Self {
        Self {
            pages,
            fail: false,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            pages: Vec::new(),
            fail: true,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<SeenImage> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl OcrEngine for StubOcr {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn recognize(&self, image_path: &FsPath) -> OcrResult<Vec<OcrPage>> {
        let img = image::open(image_path).expect("OCR input must be a readable image");
        self.seen.lock().push(SeenImage {
            path: image_path.to_path_buf(),
            width: img.width(),
            height: img.height(),
            grayscale: matches!(img, image::DynamicImage::ImageLuma8(_)),
        });

        if self.fail {
            return Err(OcrError::CommandFailed {
                status: "exit status: 1".to_string(),
                stderr: "paddle inference crashed".to_string(),
            });
        }
        Ok(self.pages.clone())
    }
}
