pub mod api_client;
pub mod prompt;

pub use api_client::GeminiClient;
pub use prompt::{build_prompt, MEDICINE_FIELDS};
