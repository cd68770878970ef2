pub mod analysis;
pub mod ocr;

// Re-export commonly used services
pub use analysis::GeminiClient;
pub use ocr::{OcrEngine, PaddleOcrEngine, TesseractEngine};
