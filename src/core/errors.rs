// Error types for the analyze pipeline
//
// One enum per concern; `AnalyzeError` is the only one that reaches HTTP.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;

use crate::core::types::AnalyzeResponse;

/// OCR engine errors
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Failed to launch OCR command `{command}`: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("OCR command exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },

    #[error("OCR produced no result file in {0}")]
    NoResults(String),

    #[error("Failed to read OCR output {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed OCR output: {0}")]
    InvalidOutput(#[from] serde_json::Error),
}

/// Gemini API errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    ApiRequestFailed(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    ApiStatus { status: u16, body: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Request pipeline errors
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("No image provided")]
    NoImage,

    #[error("Invalid image file")]
    InvalidImage(#[source] image::ImageError),

    #[error("Image processing failed: {0}")]
    ImageProcessing(#[from] image::ImageError),

    #[error("Temporary file error: {0}")]
    TempFile(#[from] std::io::Error),

    #[error("OCR failed: {0}")]
    Ocr(#[from] OcrError),

    #[error("Gemini request failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),
}

impl AnalyzeError {
    /// Input errors are the only ones answered with a non-200 status.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NoImage | Self::InvalidImage(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::OK,
        }
    }
}

impl IntoResponse for AnalyzeError {
    fn into_response(self) -> Response {
        let body = AnalyzeResponse::failure(self.to_string());
        (self.status_code(), Json(body)).into_response()
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Set GEMINI_API_KEY environment variable")]
    MissingApiKey,

    #[error("Invalid PORT value: {0}")]
    InvalidPort(String),

    #[error("Invalid CORS origin (expected http(s)://host): {0}")]
    InvalidCorsOrigin(String),

    #[error("Unknown OCR_BACKEND `{0}` (expected paddle or tesseract)")]
    InvalidOcrBackend(String),

    #[error("Invalid server config: {0}")]
    InvalidServerConfig(String),

    #[error("Invalid API config: {0}")]
    InvalidApiConfig(String),

    #[error("Invalid OCR config: {0}")]
    InvalidOcrConfig(String),
}

pub type OcrResult<T> = Result<T, OcrError>;
pub type LlmResult<T> = Result<T, LlmError>;
pub type AnalyzeResult<T> = Result<T, AnalyzeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_errors_are_bad_request() {
        assert_eq!(AnalyzeError::NoImage.status_code(), StatusCode::BAD_REQUEST);

        let decode_err = image::load_from_memory(b"not an image").unwrap_err();
        let err = AnalyzeError::InvalidImage(decode_err);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Invalid image file");
    }

    #[test]
    fn test_upstream_errors_keep_200() {
        let err = AnalyzeError::Llm(LlmError::ApiStatus {
            status: 503,
            body: "overloaded".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::OK);
        assert!(!err.to_string().is_empty());

        let err = AnalyzeError::Ocr(OcrError::NoResults("/tmp/x".to_string()));
        assert_eq!(err.status_code(), StatusCode::OK);
    }
}
