use async_trait::async_trait;
use std::path::Path;
use tracing::instrument;

use super::{base_command, run_command, OcrEngine};
use crate::core::errors::OcrResult;
use crate::core::types::OcrPage;

/// Tesseract CLI fallback engine: `tesseract <png> stdout -l <lang>`.
pub struct TesseractEngine {
    command: String,
    lang: String,
}

impl TesseractEngine {
    pub fn new(command: &str, lang: &str) -> Self {
        Self {
            command: command.to_string(),
            lang: lang.to_string(),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    #[instrument(skip(self), fields(engine = "tesseract"))]
    async fn recognize(&self, image_path: &Path) -> OcrResult<Vec<OcrPage>> {
        let mut cmd = base_command(&self.command);
        cmd.arg(image_path).arg("stdout").args(["-l", &self.lang]);

        let stdout = run_command(cmd, &self.command).await?;
        Ok(vec![parse_tesseract_output(&String::from_utf8_lossy(&stdout))])
    }
}

/// Tesseract prints one recognized line per output line; blank lines separate blocks.
fn parse_tesseract_output(text: &str) -> OcrPage {
    OcrPage {
        rec_texts: text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        rec_scores: Vec::new(),
    }
}
