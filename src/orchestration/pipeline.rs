// Analyze pipeline: decode -> preprocess -> OCR -> prompt -> Gemini

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use crate::core::config::Config;
use crate::core::errors::{AnalyzeError, AnalyzeResult, LlmResult};
use crate::core::types::{AnalysisOutcome, MedicineAnalysis};
use crate::services::analysis::{build_prompt, GeminiClient};
use crate::services::ocr::{collect_rec_texts, engine_from_config, OcrEngine};
use crate::utils::{load_image_from_memory_async, preprocess_and_encode_png_async, Metrics};

/// Runs one uploaded label image through OCR and Gemini.
pub struct AnalysisPipeline {
    ocr: Arc<dyn OcrEngine>,
    gemini: GeminiClient,
    metrics: Metrics,
}

impl AnalysisPipeline {
    pub fn new(config: &Config, metrics: Metrics) -> LlmResult<Self> {
        let ocr = engine_from_config(&config.ocr);
        let gemini = GeminiClient::new(&config.api, Some(metrics.clone()))?;
        Ok(Self::with_engine(ocr, gemini, metrics))
    }

    pub fn with_engine(ocr: Arc<dyn OcrEngine>, gemini: GeminiClient, metrics: Metrics) -> Self {
        Self {
            ocr,
            gemini,
            metrics,
        }
    }

    pub fn ocr_engine_name(&self) -> &'static str {
        self.ocr.name()
    }

    pub fn gemini_model(&self) -> &str {
        self.gemini.model()
    }

    #[instrument(skip_all, fields(upload_bytes = bytes.len()))]
    pub async fn analyze(&self, bytes: Vec<u8>) -> AnalyzeResult<AnalysisOutcome> {
        let img = load_image_from_memory_async(bytes).await?;
        debug!("Decoded upload: {}x{}", img.width(), img.height());

        let png = preprocess_and_encode_png_async(img).await?;

        // The file is removed when `temp_png` drops, on success or error.
        let temp_png = write_temp_png(png).await?;

        let ocr_start = Instant::now();
        let pages = match self.ocr.recognize(temp_png.path()).await {
            Ok(pages) => pages,
            Err(e) => {
                self.metrics.record_ocr_run(false, ocr_start.elapsed(), 0);
                return Err(e.into());
            }
        };
        drop(temp_png);

        let ocr_text = collect_rec_texts(&pages);
        self.metrics
            .record_ocr_run(true, ocr_start.elapsed(), ocr_text.len());
        info!(
            "{} extracted {} text lines from {} result(s) in {}ms",
            self.ocr.name(),
            ocr_text.len(),
            pages.len(),
            ocr_start.elapsed().as_millis()
        );

        let prompt = build_prompt(&ocr_text);
        let gemini_analysis = self.gemini.generate(&prompt).await?;
        log_analysis(&gemini_analysis);

        Ok(AnalysisOutcome {
            ocr_text,
            gemini_analysis,
        })
    }
}

async fn write_temp_png(png: Vec<u8>) -> AnalyzeResult<NamedTempFile> {
    tokio::task::spawn_blocking(move || -> std::io::Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("medilens-")
            .suffix(".png")
            .tempfile()?;
        file.write_all(&png)?;
        file.flush()?;
        Ok(file)
    })
    .await
    .map_err(|e| AnalyzeError::TaskJoinFailed(e.to_string()))?
    .map_err(AnalyzeError::TempFile)
}

fn log_analysis(text: &str) {
    debug!("Gemini response:\n{}", text);
    match MedicineAnalysis::from_llm_text(text) {
        Ok(analysis) => info!(
            medicine = analysis.medicine_name.as_deref().unwrap_or("unknown"),
            generic = analysis.generic_name.as_deref().unwrap_or("unknown"),
            alternatives = analysis.alternatives.len(),
            "Gemini identified medicine"
        ),
        Err(e) => warn!("Gemini response is not the requested JSON object: {}", e),
    }
}
