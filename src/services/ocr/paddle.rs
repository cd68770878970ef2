use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use super::{base_command, run_command, OcrEngine};
use crate::core::errors::{OcrError, OcrResult};
use crate::core::types::OcrPage;

/// PaddleOCR driven through its `paddleocr ocr` command line.
///
/// Document orientation, unwarping and text-line orientation models are
/// switched off; the label photo goes straight to detection + recognition.
/// Each result object is saved as `<stem>_res.json` under the save path.
pub struct PaddleOcrEngine {
    command: String,
    lang: String,
    output_dir: Option<PathBuf>,
}

impl PaddleOcrEngine {
    pub fn new(command: &str, lang: &str, output_dir: Option<PathBuf>) -> Self {
        Self {
            command: command.to_string(),
            lang: lang.to_string(),
            output_dir,
        }
    }

    async fn run(&self, image_path: &Path, save_dir: &Path) -> OcrResult<Vec<OcrPage>> {
        let mut cmd = base_command(&self.command);
        cmd.arg("ocr")
            .arg("-i")
            .arg(image_path)
            .args(["--lang", &self.lang])
            .args(["--use_doc_orientation_classify", "False"])
            .args(["--use_doc_unwarping", "False"])
            .args(["--use_textline_orientation", "False"])
            .arg("--save_path")
            .arg(save_dir);

        run_command(cmd, &self.command).await?;

        let stem = image_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        read_result_files(save_dir, &stem).await
    }
}

#[async_trait]
impl OcrEngine for PaddleOcrEngine {
    fn name(&self) -> &'static str {
        "paddleocr"
    }

    #[instrument(skip(self), fields(engine = "paddleocr"))]
    async fn recognize(&self, image_path: &Path) -> OcrResult<Vec<OcrPage>> {
        match &self.output_dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|source| OcrError::ReadFailed {
                        path: dir.display().to_string(),
                        source,
                    })?;
                self.run(image_path, dir).await
            }
            None => {
                // Dropped (and removed) once the results are parsed
                let scratch = tempfile::tempdir().map_err(|source| OcrError::ReadFailed {
                    path: std::env::temp_dir().display().to_string(),
                    source,
                })?;
                self.run(image_path, scratch.path()).await
            }
        }
    }
}

/// Load every `<stem>*_res.json` in `dir`, in page order.
async fn read_result_files(dir: &Path, stem: &str) -> OcrResult<Vec<OcrPage>> {
    let read_err = |source: std::io::Error| OcrError::ReadFailed {
        path: dir.display().to_string(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(read_err)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(stem) && name.ends_with("_res.json") {
            files.push((result_page_index(&name, stem), name, entry.path()));
        }
    }

    if files.is_empty() {
        return Err(OcrError::NoResults(dir.display().to_string()));
    }
    // `_10_res.json` follows `_2_res.json`; an unnumbered file comes first
    files.sort();

    let mut pages = Vec::with_capacity(files.len());
    for (_, _, path) in files {
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| OcrError::ReadFailed {
                path: path.display().to_string(),
                source,
            })?;
        let page = parse_result_json(&content)?;
        debug!("{}: {} text lines", path.display(), page.rec_texts.len());
        pages.push(page);
    }

    Ok(pages)
}

/// Page number in `<stem>_<n>_res.json`, if the name carries one.
fn result_page_index(name: &str, stem: &str) -> Option<u64> {
    name.strip_prefix(stem)?
        .strip_suffix("_res.json")?
        .trim_start_matches('_')
        .parse()
        .ok()
}

/// Parse one result object. Accepts both the bare object and the
/// `{"res": {...}}` envelope that PaddleOCR prints.
pub(crate) fn parse_result_json(content: &str) -> OcrResult<OcrPage> {
    let mut value: serde_json::Value = serde_json::from_str(content)?;
    if let Some(inner) = value.get_mut("res").filter(|v| v.is_object()) {
        let inner = inner.take();
        return Ok(serde_json::from_value(inner)?);
    }
    Ok(serde_json::from_value(value)?)
}
