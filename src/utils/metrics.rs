use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Latency samples kept per series; older samples are dropped first.
pub const LATENCY_WINDOW: usize = 1000;

/// Process-wide metrics collector.
///
/// Tracks Gemini usage, OCR runs and analyze outcomes. Cheap to clone;
/// all clones share the same counters.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    // Gemini API
    api_calls_total: AtomicUsize,
    api_calls_success: AtomicUsize,
    api_calls_failed: AtomicUsize,
    api_tokens_input: AtomicU64,
    api_tokens_output: AtomicU64,
    api_latency_ms: RwLock<VecDeque<u64>>,

    // OCR
    ocr_runs: AtomicUsize,
    ocr_failures: AtomicUsize,
    ocr_lines: AtomicUsize,
    ocr_duration_ms: RwLock<VecDeque<u64>>,

    // /analyze outcomes
    analyses_success: AtomicUsize,
    analyses_failed: AtomicUsize,
    analyses_rejected: AtomicUsize,

    endpoint_counters: DashMap<String, AtomicUsize>,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                api_calls_total: AtomicUsize::new(0),
                api_calls_success: AtomicUsize::new(0),
                api_calls_failed: AtomicUsize::new(0),
                api_tokens_input: AtomicU64::new(0),
                api_tokens_output: AtomicU64::new(0),
                api_latency_ms: RwLock::new(VecDeque::with_capacity(LATENCY_WINDOW)),
                ocr_runs: AtomicUsize::new(0),
                ocr_failures: AtomicUsize::new(0),
                ocr_lines: AtomicUsize::new(0),
                ocr_duration_ms: RwLock::new(VecDeque::with_capacity(LATENCY_WINDOW)),
                analyses_success: AtomicUsize::new(0),
                analyses_failed: AtomicUsize::new(0),
                analyses_rejected: AtomicUsize::new(0),
                endpoint_counters: DashMap::new(),
                start_time: Instant::now(),
            }),
        }
    }

    pub fn record_api_call(&self, success: bool, duration: Duration, input_tokens: u64, output_tokens: u64) {
        self.inner.api_calls_total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.inner.api_calls_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.api_calls_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.api_tokens_input.fetch_add(input_tokens, Ordering::Relaxed);
        self.inner.api_tokens_output.fetch_add(output_tokens, Ordering::Relaxed);
        push_sample(&self.inner.api_latency_ms, duration);
    }

    pub fn record_ocr_run(&self, success: bool, duration: Duration, lines: usize) {
        self.inner.ocr_runs.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.inner.ocr_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.ocr_lines.fetch_add(lines, Ordering::Relaxed);
        push_sample(&self.inner.ocr_duration_ms, duration);
    }

    pub fn record_analysis_success(&self) {
        self.inner.analyses_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_analysis_failure(&self) {
        self.inner.analyses_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Request refused before the pipeline ran (no file / undecodable image).
    pub fn record_analysis_rejected(&self) {
        self.inner.analyses_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_endpoint_request(&self, endpoint: &str) {
        self.inner.endpoint_counters
            .entry(endpoint.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let api_latency: Vec<u64> = self.inner.api_latency_ms.read().iter().copied().collect();
        let api_latency_avg = avg(&api_latency);
        let api_latency_p50 = percentile(&api_latency, 0.5);
        let api_latency_p95 = percentile(&api_latency, 0.95);
        let api_latency_p99 = percentile(&api_latency, 0.99);

        let ocr_durations: Vec<u64> = self.inner.ocr_duration_ms.read().iter().copied().collect();
        let ocr_avg = avg(&ocr_durations);
        let ocr_p95 = percentile(&ocr_durations, 0.95);

        let mut endpoint_requests: Vec<(String, usize)> = self
            .inner
            .endpoint_counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();
        endpoint_requests.sort();

        MetricsSnapshot {
            api_calls_total: self.inner.api_calls_total.load(Ordering::Relaxed),
            api_calls_success: self.inner.api_calls_success.load(Ordering::Relaxed),
            api_calls_failed: self.inner.api_calls_failed.load(Ordering::Relaxed),
            api_tokens_input: self.inner.api_tokens_input.load(Ordering::Relaxed),
            api_tokens_output: self.inner.api_tokens_output.load(Ordering::Relaxed),
            api_latency_avg_ms: api_latency_avg,
            api_latency_p50_ms: api_latency_p50,
            api_latency_p95_ms: api_latency_p95,
            api_latency_p99_ms: api_latency_p99,
            ocr_runs: self.inner.ocr_runs.load(Ordering::Relaxed),
            ocr_failures: self.inner.ocr_failures.load(Ordering::Relaxed),
            ocr_lines: self.inner.ocr_lines.load(Ordering::Relaxed),
            ocr_avg_ms: ocr_avg,
            ocr_p95_ms: ocr_p95,
            analyses_success: self.inner.analyses_success.load(Ordering::Relaxed),
            analyses_failed: self.inner.analyses_failed.load(Ordering::Relaxed),
            analyses_rejected: self.inner.analyses_rejected.load(Ordering::Relaxed),
            endpoint_requests,
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = format!(
            r#"# HELP api_calls_total Total number of Gemini API calls made
# TYPE api_calls_total counter
api_calls_total {{}} {}

# HELP api_calls_success Number of successful Gemini API calls
# TYPE api_calls_success counter
api_calls_success {{}} {}

# HELP api_calls_failed Number of failed Gemini API calls
# TYPE api_calls_failed counter
api_calls_failed {{}} {}

# HELP api_tokens_input_total Total input tokens consumed
# TYPE api_tokens_input_total counter
api_tokens_input_total {{}} {}

# HELP api_tokens_output_total Total output tokens generated
# TYPE api_tokens_output_total counter
api_tokens_output_total {{}} {}

# HELP api_latency_avg_ms Average Gemini latency in milliseconds
# TYPE api_latency_avg_ms gauge
api_latency_avg_ms {{}} {}

# HELP ocr_runs_total Total OCR engine invocations
# TYPE ocr_runs_total counter
ocr_runs_total {{}} {}

# HELP ocr_failures_total Failed OCR engine invocations
# TYPE ocr_failures_total counter
ocr_failures_total {{}} {}

# HELP ocr_lines_total Recognized text lines
# TYPE ocr_lines_total counter
ocr_lines_total {{}} {}

# HELP ocr_avg_duration_ms Average OCR duration in milliseconds
# TYPE ocr_avg_duration_ms gauge
ocr_avg_duration_ms {{}} {}

# HELP analyses_total Analyze requests by outcome
# TYPE analyses_total counter
analyses_total {{outcome="success"}} {}
analyses_total {{outcome="failed"}} {}
analyses_total {{outcome="rejected"}} {}

# HELP uptime_seconds Application uptime in seconds
# TYPE uptime_seconds counter
uptime_seconds {{}} {}
"#,
            snapshot.api_calls_total,
            snapshot.api_calls_success,
            snapshot.api_calls_failed,
            snapshot.api_tokens_input,
            snapshot.api_tokens_output,
            snapshot.api_latency_avg_ms,
            snapshot.ocr_runs,
            snapshot.ocr_failures,
            snapshot.ocr_lines,
            snapshot.ocr_avg_ms,
            snapshot.analyses_success,
            snapshot.analyses_failed,
            snapshot.analyses_rejected,
            snapshot.uptime_seconds,
        );

        if !snapshot.endpoint_requests.is_empty() {
            out.push_str("\n# HELP http_requests_total Requests per endpoint\n");
            out.push_str("# TYPE http_requests_total counter\n");
            for (endpoint, count) in &snapshot.endpoint_requests {
                out.push_str(&format!(
                    "http_requests_total {{endpoint=\"{}\"}} {}\n",
                    endpoint, count
                ));
            }
        }

        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub api_calls_total: usize,
    pub api_calls_success: usize,
    pub api_calls_failed: usize,
    pub api_tokens_input: u64,
    pub api_tokens_output: u64,
    pub api_latency_avg_ms: u64,
    pub api_latency_p50_ms: u64,
    pub api_latency_p95_ms: u64,
    pub api_latency_p99_ms: u64,
    pub ocr_runs: usize,
    pub ocr_failures: usize,
    pub ocr_lines: usize,
    pub ocr_avg_ms: u64,
    pub ocr_p95_ms: u64,
    pub analyses_success: usize,
    pub analyses_failed: usize,
    pub analyses_rejected: usize,
    pub endpoint_requests: Vec<(String, usize)>,
    pub uptime_seconds: u64,
}

fn push_sample(window: &RwLock<VecDeque<u64>>, duration: Duration) {
    let mut samples = window.write();
    if samples.len() == LATENCY_WINDOW {
        samples.pop_front();
    }
    samples.push_back(duration.as_millis() as u64);
}

fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}
