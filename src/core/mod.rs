pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::{Config, CorsOrigins, OcrBackend};
pub use errors::{AnalyzeError, ConfigError, LlmError, OcrError};
pub use types::{AnalysisOutcome, AnalyzeResponse, MedicineAnalysis, OcrPage};
