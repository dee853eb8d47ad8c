//! Model prompts for both collaborator calls.
//!
//! Stage 1 sends [`DEFAULT_PARSING_INSTRUCTION`] with every page (image or
//! text); stage 2 sends [`DEFAULT_EXTRACTION_PROMPT`] with each parsed
//! Markdown document. Both can be overridden through
//! [`crate::config::PipelineConfig`].
//!
//! [`DEED_FIELDS`] is the field vocabulary the extraction prompt asks for. It
//! is also what [`crate::config::SchemaValidation`] checks extracted keys
//! against, so the two must change together.

/// Land-deed fields requested from the extraction model, in output order.
pub const DEED_FIELDS: &[&str] = &[
    "เลขโฉนดที่ดิน",
    "หน้าสำรวจ",
    "เลขที่ดิน",
    "ระวาง",
    "ตำบล",
    "อำเภอ",
    "จังหวัด",
    "เนื้อที่",
    "ราคาประเมินที่ดิน",
    "ค่าพิกัดแปลง",
    "ข้อมูลการเดินทาง",
];

/// Default stage 1 instruction for turning one page into Markdown.
pub const DEFAULT_PARSING_INSTRUCTION: &str = r#"You are an expert document converter. The page you are given may contain tables, images and text. Convert it to clean, well-structured Markdown and extract all detailed information.

1. TEXT
   - Preserve ALL text exactly, in the language it is written in (Thai stays Thai)
   - Keep the reading order a human would use

2. TABLES
   - Convert tables to GFM pipe tables

3. IMAGES
   - If the page contains images that illustrate examples or how to resolve a case,
     describe those examples in detail as text

4. OUTPUT FORMAT
   - Output ONLY the Markdown content
   - Do NOT wrap in ```markdown fences
   - Do NOT add commentary or "Page X of Y" markers"#;

/// Default stage 2 system prompt for extracting deed fields from Markdown.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"You are given a structured Markdown document that contains information from a Thai land deed.

Extract the relevant key-value pairs from the Markdown and return them as one clean JSON object using exactly the field names below.

Rules:
- Read the Markdown carefully and focus only on fields typically found in Thai land deeds.
- Use the Thai field names as JSON keys.
- If a value is missing from the document, leave the field out entirely. Do not output null, empty strings or placeholders.
- Every value must be a string. Coordinates and URLs are strings too.
- Do not include any Markdown syntax in values (no #, |, ** and so on).

Return a single valid JSON object in this format:
{
  "เลขโฉนดที่ดิน": "<string>",
  "หน้าสำรวจ": "<string>",
  "เลขที่ดิน": "<string>",
  "ระวาง": "<string>",
  "ตำบล": "<string>",
  "อำเภอ": "<string>",
  "จังหวัด": "<string>",
  "เนื้อที่": "<string>",
  "ราคาประเมินที่ดิน": "<string>",
  "ค่าพิกัดแปลง": "<latitude,longitude>",
  "ข้อมูลการเดินทาง": "<string>"
}"#;

/// Wrap a text page for the parsing model.
///
/// Text-bearing formats (plain text, CSV, HTML, Office XML) reach the model
/// as text rather than an image; the delimiters keep the document apart from
/// the instruction.
pub fn text_page_message(text: &str) -> String {
    format!("Convert the following document text to Markdown:\n\n\"\"\"\n{}\n\"\"\"", text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_prompt_lists_every_field() {
        for field in DEED_FIELDS {
            assert!(
                DEFAULT_EXTRACTION_PROMPT.contains(&format!("\"{field}\"")),
                "prompt is missing {field}"
            );
        }
    }

    #[test]
    fn source_file_is_not_a_deed_field() {
        assert!(!DEED_FIELDS.contains(&crate::merge::SOURCE_FILE_FIELD));
    }

    #[test]
    fn text_page_message_embeds_text() {
        let msg = text_page_message("โฉนดที่ดิน 123");
        assert!(msg.contains("โฉนดที่ดิน 123"));
    }
}
