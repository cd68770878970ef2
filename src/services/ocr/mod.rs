// OCR Service Module - external OCR engines driven through a PNG file handoff
//
// The engine binary runs as a child process; its result objects are mapped
// onto `OcrPage`.

mod paddle;
mod tesseract;

pub use paddle::PaddleOcrEngine;
pub use tesseract::TesseractEngine;

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::core::config::{OcrBackend, OcrConfig};
use crate::core::errors::{OcrError, OcrResult};
use crate::core::types::OcrPage;

/// Longest stderr excerpt carried in an error message
const STDERR_EXCERPT: usize = 512;

/// A text recognizer that reads a PNG from disk.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Short engine name for logs
    fn name(&self) -> &'static str;

    /// Recognize text in the image at `image_path`, one `OcrPage` per result object.
    async fn recognize(&self, image_path: &Path) -> OcrResult<Vec<OcrPage>>;
}

/// Flatten every page's `rec_texts`, preserving order.
pub fn collect_rec_texts(pages: &[OcrPage]) -> Vec<String> {
    pages
        .iter()
        .flat_map(|page| page.rec_texts.iter().cloned())
        .collect()
}

/// Build the engine selected by configuration.
pub fn engine_from_config(config: &OcrConfig) -> Arc<dyn OcrEngine> {
    match config.backend {
        OcrBackend::Paddle => Arc::new(PaddleOcrEngine::new(
            &config.command,
            &config.lang,
            config.output_dir.clone(),
        )),
        OcrBackend::Tesseract => Arc::new(TesseractEngine::new(&config.command, &config.lang)),
    }
}

/// Split a command line such as `python -m paddleocr` into program and leading args.
fn split_command(command_line: &str) -> (String, Vec<String>) {
    let mut parts = command_line.split_whitespace().map(str::to_string);
    let program = parts.next().unwrap_or_default();
    (program, parts.collect())
}

fn base_command(command_line: &str) -> Command {
    let (program, leading_args) = split_command(command_line);
    let mut cmd = Command::new(program);
    cmd.args(leading_args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Run an OCR command to completion and return its stdout.
async fn run_command(mut cmd: Command, command_line: &str) -> OcrResult<Vec<u8>> {
    debug!("Running OCR command: {:?}", cmd.as_std());

    let output = cmd.output().await.map_err(|source| OcrError::SpawnFailed {
        command: command_line.to_string(),
        source,
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        let start = stderr
            .char_indices()
            .rev()
            .nth(STDERR_EXCERPT)
            .map(|(i, _)| i)
            .unwrap_or(0);
        return Err(OcrError::CommandFailed {
            status: output.status.to_string(),
            stderr: stderr[start..].to_string(),
        });
    }

    Ok(output.stdout)
}

/// Check whether an OCR command can be launched at all.
pub async fn is_ocr_available(command_line: &str) -> bool {
    let (program, leading_args) = split_command(command_line);
    let status = Command::new(&program)
        .args(leading_args)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match status {
        Ok(status) => status.success(),
        Err(e) => {
            warn!("OCR command `{}` is not runnable: {}", program, e);
            false
        }
    }
}
