use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use crate::core::config::ApiConfig;
use crate::core::errors::{LlmError, LlmResult};
use crate::utils::Metrics;

// Caps the backoff at 2^6 = 64 s per retry
const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Gemini `generateContent` client with timeouts and metrics
#[derive(Clone)]
pub struct GeminiClient {
    api: ApiConfig,
    http_client: reqwest::Client,
    metrics: Option<Metrics>,
}

impl GeminiClient {
    pub fn new(api: &ApiConfig, metrics: Option<Metrics>) -> LlmResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(api.timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            api: api.clone(),
            http_client,
            metrics,
        })
    }

    pub fn model(&self) -> &str {
        &self.api.model
    }

    /// Send `prompt` as a single user turn and return the model's text.
    #[instrument(skip(self, prompt), fields(model = %self.api.model, prompt_chars = prompt.len()))]
    pub async fn generate(&self, prompt: &str) -> LlmResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.api.base_url, self.api.model
        );

        let request_body = json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": prompt}]
            }]
        });

        let start = Instant::now();
        let result = self.send_with_retries(&url, &request_body).await;
        let duration = start.elapsed();

        let parsed = result.and_then(|response_text| {
            let response: Value = serde_json::from_str(&response_text).map_err(|e| {
                LlmError::InvalidResponse(format!("response is not JSON: {}", e))
            })?;
            let text = extract_text(&response)?;
            Ok((text, extract_token_usage(&response)))
        });

        match parsed {
            Ok((text, (input_tokens, output_tokens))) => {
                if let Some(ref m) = self.metrics {
                    m.record_api_call(true, duration, input_tokens, output_tokens);
                }
                debug!(
                    "Gemini responded in {}ms ({} input / {} output tokens)",
                    duration.as_millis(),
                    input_tokens,
                    output_tokens
                );
                Ok(text)
            }
            Err(e) => {
                if let Some(ref m) = self.metrics {
                    m.record_api_call(false, duration, 0, 0);
                }
                warn!("Gemini request failed after {}ms: {}", duration.as_millis(), e);
                Err(e)
            }
        }
    }

    async fn send_with_retries(&self, url: &str, body: &Value) -> LlmResult<String> {
        let max_retries = self.api.max_retries;
        let mut attempt = 0;

        loop {
            let error = match self
                .http_client
                .post(url)
                .header("Content-Type", "application/json")
                .header("x-goog-api-key", &self.api.api_key)
                .json(body)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    return response
                        .text()
                        .await
                        .map_err(|e| LlmError::ApiRequestFailed(e.without_url()));
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    LlmError::ApiStatus { status, body }
                }
                // Request URLs stay out of error text and logs
                Err(e) => LlmError::ApiRequestFailed(e.without_url()),
            };

            if attempt >= max_retries {
                return Err(error);
            }

            debug!(
                "Gemini request failed: {}. Retrying ({}/{})",
                error,
                attempt + 1,
                max_retries
            );
            tokio::time::sleep(backoff_delay(attempt)).await;
            attempt += 1;
        }
    }
}

/// Exponential backoff with up to a second of jitter.
fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = 2_u64.pow(attempt.min(MAX_BACKOFF_EXPONENT)) * 1000;
    let jitter = rand::random::<u64>() % 1000;
    Duration::from_millis(base_ms + jitter)
}

/// Concatenate the text parts of the first candidate.
fn extract_text(response: &Value) -> LlmResult<String> {
    let Some(candidate) = response["candidates"].get(0) else {
        let reason = response["promptFeedback"]["blockReason"]
            .as_str()
            .unwrap_or("no candidates returned");
        return Err(LlmError::InvalidResponse(format!(
            "Gemini returned no candidates ({})",
            reason
        )));
    };

    let text: String = candidate["content"]["parts"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
        .unwrap_or_default();

    if text.is_empty() {
        let reason = candidate["finishReason"].as_str().unwrap_or("UNKNOWN");
        return Err(LlmError::InvalidResponse(format!(
            "Gemini candidate has no text (finishReason: {})",
            reason
        )));
    }

    Ok(text)
}

/// Extract token usage from Gemini API response
///
/// Returns (input_tokens, output_tokens) if available, otherwise (0, 0)
fn extract_token_usage(response: &Value) -> (u64, u64) {
    let usage_metadata = &response["usageMetadata"];
    let input_tokens = usage_metadata["promptTokenCount"].as_u64().unwrap_or(0);
    let output_tokens = usage_metadata["candidatesTokenCount"].as_u64().unwrap_or(0);

    (input_tokens, output_tokens)
}
