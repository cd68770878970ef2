//! Prompt sent to Gemini for a scanned medicine label.

/// Fields requested from the model, with the hint shown next to each.
pub const MEDICINE_FIELDS: [(&str, &str); 10] = [
    ("medicineName", "Full name of medicine"),
    ("composition", "Ingredients"),
    ("usage", "Primary use"),
    ("dosage", "Standard dosage"),
    ("manufacturer", "Company name"),
    ("side_effects", "Common side effects"),
    ("warning", "Safety warnings"),
    ("buy_link", "URL"),
    (
        "alternatives",
        "Provide an ARRAY of strings (e.g., [\"Med A\", \"Med B\"]) containing generic medicines with the same composition.",
    ),
    (
        "generic_name",
        "The primary active salt (e.g., \"Paracetamol\")",
    ),
];

/// Search page the model is told to build `buy_link` from.
pub const BUY_LINK_BASE: &str = "https://www.1mg.com/search/all?name=";

const INSTRUCTIONS: &str = "Act as a professional medical assistant. I have scanned a medicine label.
Based on the EXTRACTED TEXT below, identify the medicine.
If specific fields like 'usage' or 'side_effects' are missing from the text but you recognize the medicine name, use your medical knowledge to provide accurate information, also provide the generic name and alternatives and fetch best buy link for medicine.
Return ONLY a valid JSON object:";

/// Build the analysis prompt. The OCR lines are joined with single spaces
/// and embedded verbatim.
pub fn build_prompt(ocr_texts: &[String]) -> String {
    let full_text = ocr_texts.join(" ");

    let fields = MEDICINE_FIELDS
        .iter()
        .map(|(name, hint)| format!("  \"{}\": \"{}\"", name, hint))
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        "{INSTRUCTIONS}\n{{\n{fields}\n}}\n\n\
         LINK LOGIC:\n\
         Construct the 'buy_link' using this exact format to ensure it never breaks:\n\
         {BUY_LINK_BASE}{{medicineName}}\n\
         Replace {{medicineName}} with the actual name, using '+' for spaces.\n\n\
         EXTRACTED TEXT: {full_text}\n"
    )
}
