//! The per-file work of the parse and extract stages.
//!
//! Each transform adapts a collaborator to [`FileTransform`]: it names the
//! stage's output files and turns one input document into the text the
//! processor writes.

use crate::config::SchemaValidation;
use crate::error::FileError;
use crate::merge::ExtractedRecord;
use crate::pipeline::{DocumentParser, ParsedPage, TextExtractor};
use crate::processor::{FileTransform, OutputNaming};
use crate::prompts::DEED_FIELDS;
use crate::walker::DocumentRecord;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Stage 1: document → `<stem>_parsed.md`.
pub struct ParseTransform {
    parser: Arc<dyn DocumentParser>,
}

impl ParseTransform {
    pub fn new(parser: Arc<dyn DocumentParser>) -> Self {
        Self { parser }
    }
}

#[async_trait]
impl FileTransform for ParseTransform {
    fn output_naming(&self) -> OutputNaming {
        OutputNaming::with_extension("md").suffix("_parsed")
    }

    async fn transform(&self, record: &DocumentRecord) -> Result<String, FileError> {
        let pages = self.parser.parse(&record.absolute_path).await?;
        debug!("{}: {} pages parsed", record.relative_display(), pages.len());
        Ok(render_parsed_document(&record.relative_display(), &pages))
    }
}

/// Assemble the stage 1 document: a title header naming the source, then
/// one `# Page i/total` section per page.
pub fn render_parsed_document(relative_path: &str, pages: &[ParsedPage]) -> String {
    let total = pages.len();
    let mut out = format!("# Parsed content from \"{}\"\n\n", relative_path);
    for (i, page) in pages.iter().enumerate() {
        out.push_str(&format!("# Page {}/{}\n\n", i + 1, total));
        out.push_str(page.markdown.trim_end());
        out.push_str("\n\n");
    }
    out
}

/// Stage 2: `<stem>.md` → `<stem>.json`.
pub struct ExtractTransform {
    extractor: Arc<dyn TextExtractor>,
    validation: SchemaValidation,
}

impl ExtractTransform {
    pub fn new(extractor: Arc<dyn TextExtractor>, validation: SchemaValidation) -> Self {
        Self {
            extractor,
            validation,
        }
    }
}

#[async_trait]
impl FileTransform for ExtractTransform {
    fn output_naming(&self) -> OutputNaming {
        OutputNaming::with_extension("json")
    }

    async fn transform(&self, record: &DocumentRecord) -> Result<String, FileError> {
        let markdown = tokio::fs::read_to_string(&record.absolute_path)
            .await
            .map_err(|e| FileError::io(&record.absolute_path, e))?;

        let extracted = self.extractor.extract(&markdown).await?;
        validate_fields(&extracted, self.validation, &record.relative_display())?;

        serde_json::to_string_pretty(&extracted).map_err(|e| FileError::InvalidJson {
            detail: e.to_string(),
        })
    }
}

/// Keys of `record` that are not deed fields.
pub fn unexpected_fields(record: &ExtractedRecord) -> Vec<String> {
    record
        .keys()
        .filter(|k| !DEED_FIELDS.contains(&k.as_str()))
        .cloned()
        .collect()
}

fn validate_fields(
    record: &ExtractedRecord,
    validation: SchemaValidation,
    relative_path: &str,
) -> Result<(), FileError> {
    if validation == SchemaValidation::Off {
        return Ok(());
    }
    let keys = unexpected_fields(record);
    if keys.is_empty() {
        return Ok(());
    }
    match validation {
        SchemaValidation::Reject => Err(FileError::UnexpectedFields { keys }),
        _ => {
            warn!(
                "{}: unexpected fields in extracted record: {}",
                relative_path,
                keys.join(", ")
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::path::{Path, PathBuf};

    struct Fixed(Value);

    #[async_trait]
    impl TextExtractor for Fixed {
        async fn extract(&self, _markdown: &str) -> Result<ExtractedRecord, FileError> {
            match &self.0 {
                Value::Object(m) => Ok(m.clone()),
                _ => Err(FileError::InvalidJson {
                    detail: "fixture".into(),
                }),
            }
        }
    }

    fn md_record(dir: &Path) -> DocumentRecord {
        let abs = dir.join("c_parsed.md");
        std::fs::write(&abs, "# Parsed content from \"c.pdf\"\n").unwrap();
        DocumentRecord {
            absolute_path: abs,
            relative_path: PathBuf::from("c_parsed.md"),
        }
    }

    #[test]
    fn parsed_document_layout() {
        let pages = vec![
            ParsedPage {
                page_num: 1,
                markdown: "หน้าแรก\n".into(),
            },
            ParsedPage {
                page_num: 2,
                markdown: "second".into(),
            },
        ];
        assert_eq!(
            render_parsed_document("a/b/c.pdf", &pages),
            "# Parsed content from \"a/b/c.pdf\"\n\n# Page 1/2\n\nหน้าแรก\n\n# Page 2/2\n\nsecond\n\n"
        );
    }

    #[test]
    fn zero_pages_is_header_only() {
        assert_eq!(
            render_parsed_document("x.txt", &[]),
            "# Parsed content from \"x.txt\"\n\n"
        );
    }

    #[test]
    fn naming() {
        let parse = ParseTransform::new(Arc::new(NoPages));
        assert_eq!(
            parse.output_naming().file_name(Path::new("c.pdf")).unwrap(),
            "c_parsed.md"
        );
        let extract = ExtractTransform::new(Arc::new(Fixed(json!({}))), SchemaValidation::Off);
        assert_eq!(
            extract.output_naming().file_name(Path::new("c_parsed.md")).unwrap(),
            "c_parsed.json"
        );
    }

    struct NoPages;

    #[async_trait]
    impl DocumentParser for NoPages {
        async fn parse(&self, _path: &Path) -> Result<Vec<ParsedPage>, FileError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn extract_writes_pretty_json_with_literal_thai() {
        let dir = tempfile::tempdir().unwrap();
        let t = ExtractTransform::new(
            Arc::new(Fixed(json!({"เลขโฉนดที่ดิน": "99", "ตำบล": "บางรัก"}))),
            SchemaValidation::Off,
        );
        let out = t.transform(&md_record(dir.path())).await.unwrap();
        assert_eq!(out, "{\n  \"เลขโฉนดที่ดิน\": \"99\",\n  \"ตำบล\": \"บางรัก\"\n}");
    }

    #[tokio::test]
    async fn schema_validation_modes() {
        let dir = tempfile::tempdir().unwrap();
        let rec = md_record(dir.path());
        let body = json!({"ตำบล": "บางรัก", "colour": "red"});

        let warn = ExtractTransform::new(Arc::new(Fixed(body.clone())), SchemaValidation::Warn);
        assert!(warn.transform(&rec).await.is_ok());

        let reject = ExtractTransform::new(Arc::new(Fixed(body)), SchemaValidation::Reject);
        let err = reject.transform(&rec).await.unwrap_err();
        assert!(matches!(err, FileError::UnexpectedFields { ref keys } if keys == &["colour"]));
    }
}
