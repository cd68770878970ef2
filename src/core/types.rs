// Wire types shared by the OCR engines, the Gemini client and the HTTP layer

use serde::{Deserialize, Deserializer, Serialize};

/// One OCR result object, as written by PaddleOCR's `*_res.json`.
///
/// Only the recognition fields are kept; a result without `rec_texts`
/// contributes nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrPage {
    #[serde(default)]
    pub rec_texts: Vec<String>,
    #[serde(default)]
    pub rec_scores: Vec<f32>,
}

/// Body of every `/analyze` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalyzeResponse {
    Success {
        success: bool,
        ocr_text: Vec<String>,
        gemini_analysis: String,
    },
    Failure {
        success: bool,
        error: String,
    },
}

impl AnalyzeResponse {
    pub fn success(ocr_text: Vec<String>, gemini_analysis: String) -> Self {
        Self::Success {
            success: true,
            ocr_text,
            gemini_analysis,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        Self::Failure {
            success: false,
            error: if error.is_empty() {
                "Unknown error".to_string()
            } else {
                error
            },
        }
    }
}

/// Output of a successful pipeline run
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub ocr_text: Vec<String>,
    pub gemini_analysis: String,
}

impl From<AnalysisOutcome> for AnalyzeResponse {
    fn from(outcome: AnalysisOutcome) -> Self {
        AnalyzeResponse::success(outcome.ocr_text, outcome.gemini_analysis)
    }
}

/// Structured medicine description the prompt asks Gemini for.
///
/// Gemini is not forced to comply, so every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MedicineAnalysis {
    #[serde(rename = "medicineName")]
    pub medicine_name: Option<String>,
    pub composition: Option<String>,
    pub usage: Option<String>,
    pub dosage: Option<String>,
    pub manufacturer: Option<String>,
    pub side_effects: Option<String>,
    pub warning: Option<String>,
    pub buy_link: Option<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub alternatives: Vec<String>,
    pub generic_name: Option<String>,
}

impl MedicineAnalysis {
    /// Parse the raw LLM text, tolerating Markdown code fences around the JSON.
    pub fn from_llm_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(strip_code_fences(text))
    }
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

// Some responses put a comma-separated string where an array was asked for.
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Alternatives {
        List(Vec<String>),
        Text(String),
        Missing(Option<()>),
    }

    Ok(match Alternatives::deserialize(deserializer)? {
        Alternatives::List(list) => list,
        Alternatives::Text(text) => text
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Alternatives::Missing(_) => Vec::new(),
    })
}
