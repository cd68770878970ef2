pub mod image_ops;
pub mod metrics;

// Re-export commonly used items
pub use image_ops::{
    decode_image,
    load_image_from_memory_async,
    preprocess_and_encode_png_async,
    preprocess_for_ocr,
};
pub use metrics::{Metrics, MetricsSnapshot};
