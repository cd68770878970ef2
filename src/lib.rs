// Library exports for the medicine label analysis service

// Core modules
pub mod core;
pub mod orchestration;
pub mod server;
pub mod services;
pub mod utils;

#[cfg(test)]
mod test_support;

// Re-export commonly used types and functions
pub use core::{
    config::Config,
    errors::{AnalyzeError, ConfigError, LlmError, OcrError},
    types::{AnalysisOutcome, AnalyzeResponse, MedicineAnalysis, OcrPage},
};

pub use orchestration::AnalysisPipeline;

pub use server::{router, AppState};

pub use services::{GeminiClient, OcrEngine, PaddleOcrEngine, TesseractEngine};

pub use utils::{load_image_from_memory_async, preprocess_and_encode_png_async, Metrics};
