//! Stage 3: collate every extracted record into one merged dataset.
//!
//! The merger reads the extract stage's output tree (never writes to it),
//! tags each record with the file it came from, sorts by the configured key
//! and writes `{"total_records": n, "data": [...]}` in one piece.
//!
//! ## Ordering
//!
//! Records are sorted with a stable sort on the string value of the sort
//! key. A record without the key (or with `null`) sorts as the empty string,
//! so it lands before every non-empty value and keeps walk order among
//! other keyless records. Non-string values compare by their compact JSON
//! text. Walk order is by file name, which makes the whole output a pure
//! function of the input tree.

use crate::error::{FileError, PipelineError};
use crate::processor::{write_atomic, FileStatus};
use crate::progress::ProgressCallback;
use crate::stage::{check_input_root, warn_no_files, StageKind, StageSummary, JSON_EXTENSIONS};
use crate::walker::{DocumentRecord, TreeWalker};
use serde::Serialize;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Field injected into every merged record; extracted records must not use it.
pub const SOURCE_FILE_FIELD: &str = "source_file";

/// One extracted record: field name → value, in the order the fields were written.
pub type ExtractedRecord = Map<String, Value>;

/// The merged output document.
///
/// `total_records` always equals `data.len()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedDataset {
    pub total_records: usize,
    pub data: Vec<ExtractedRecord>,
}

impl MergedDataset {
    pub fn new(data: Vec<ExtractedRecord>) -> Self {
        Self {
            total_records: data.len(),
            data,
        }
    }

    /// Pretty JSON, two-space indented, non-ASCII written literally.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Result of a merge run.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// `processed_count` is records loaded, `failed_count` is files skipped
    /// as unreadable or invalid.
    pub summary: StageSummary,
    /// `None` when no record could be loaded; nothing was written then.
    pub dataset: Option<MergedDataset>,
    pub output_file: PathBuf,
}

/// Loads, tags, sorts and writes extracted records.
pub struct Merger {
    sort_key: String,
    progress: Option<ProgressCallback>,
}

impl Merger {
    pub fn new(sort_key: impl Into<String>) -> Self {
        Self {
            sort_key: sort_key.into(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Merge every `.json` file under `input_root` into `output_file`.
    ///
    /// Files that cannot be read or are not a JSON object are logged and
    /// left out. When no record loads, a diagnostic is logged and
    /// `output_file` is left untouched. Otherwise it is replaced wholesale.
    ///
    /// # Errors
    /// [`PipelineError::StageStartup`] when `input_root` is not a readable
    /// directory, [`PipelineError::MergeWriteFailed`] when the dataset cannot
    /// be written.
    pub async fn merge(
        &self,
        input_root: &Path,
        output_file: &Path,
    ) -> Result<MergeOutcome, PipelineError> {
        check_input_root(StageKind::Merge, input_root).await?;
        info!("Scanning directory: {}", input_root.display());

        let records: Vec<DocumentRecord> = TreeWalker::new(input_root, JSON_EXTENSIONS).walk().collect();
        let mut summary = StageSummary {
            discovered_count: records.len(),
            ..Default::default()
        };

        if let Some(ref cb) = self.progress {
            cb.on_stage_start(StageKind::Merge, records.len());
        }

        let mut data = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            if let Some(ref cb) = self.progress {
                cb.on_file_start(StageKind::Merge, &record.relative_path, i + 1, records.len());
            }

            debug!("Processing: {}", record.absolute_path.display());
            match load_record(record).await {
                Ok(value) => {
                    summary.record(&FileStatus::Success);
                    if let Some(ref cb) = self.progress {
                        cb.on_file_complete(StageKind::Merge, &record.relative_path, &FileStatus::Success);
                    }
                    data.push(value);
                }
                Err(e) => {
                    warn!("Error reading {}: {}", record.absolute_path.display(), e);
                    summary.record(&FileStatus::Failed(e.clone()));
                    if let Some(ref cb) = self.progress {
                        cb.on_file_error(StageKind::Merge, &record.relative_path, &e.to_string());
                    }
                }
            }
        }

        let outcome = if data.is_empty() {
            if records.is_empty() {
                warn_no_files(StageKind::Merge, input_root, JSON_EXTENSIONS);
            } else {
                warn!("{}", unloadable_diagnostic(records.len(), input_root));
            }
            MergeOutcome {
                summary,
                dataset: None,
                output_file: output_file.to_path_buf(),
            }
        } else {
            sort_records(&mut data, &self.sort_key);
            let dataset = MergedDataset::new(data);
            write_dataset(&dataset, output_file).await?;

            info!("Successfully merged {} JSON files", summary.processed_count);
            info!("Output saved to: {}", output_file.display());
            info!("Total records: {}", dataset.total_records);

            MergeOutcome {
                summary,
                dataset: Some(dataset),
                output_file: output_file.to_path_buf(),
            }
        };

        if let Some(ref cb) = self.progress {
            cb.on_stage_complete(StageKind::Merge, &outcome.summary);
        }

        Ok(outcome)
    }
}

/// Diagnostic for a merge whose JSON files were all skipped.
fn unloadable_diagnostic(found: usize, input_root: &Path) -> String {
    format!(
        "Found {} JSON file(s) in {}, but none could be loaded; see the errors above. \
         No merged file was written.",
        found,
        input_root.display()
    )
}

/// Read one extracted record and tag it with its relative path.
async fn load_record(record: &DocumentRecord) -> Result<ExtractedRecord, FileError> {
    let text = tokio::fs::read_to_string(&record.absolute_path)
        .await
        .map_err(|e| FileError::io(&record.absolute_path, e))?;

    let value: Value = serde_json::from_str(&text).map_err(|e| FileError::InvalidJson {
        detail: format!("Invalid JSON format - {e}"),
    })?;

    let mut map = match value {
        Value::Object(map) => map,
        other => {
            return Err(FileError::InvalidJson {
                detail: format!("expected an object, found {}", json_kind(&other)),
            })
        }
    };

    let source = record.relative_display();
    if let Some(previous) = map.insert(SOURCE_FILE_FIELD.to_string(), Value::String(source)) {
        warn!(
            "{} already carried a '{}' field ({}); replaced with its path",
            record.absolute_path.display(),
            SOURCE_FILE_FIELD,
            previous
        );
    }
    Ok(map)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Stable ascending sort by the string value of `key`.
pub fn sort_records(records: &mut [ExtractedRecord], key: &str) {
    records.sort_by(|a, b| sort_value(a, key).cmp(&sort_value(b, key)));
}

fn sort_value<'a>(record: &'a ExtractedRecord, key: &str) -> Cow<'a, str> {
    match record.get(key) {
        None | Some(Value::Null) => Cow::Borrowed(""),
        Some(Value::String(s)) => Cow::Borrowed(s.as_str()),
        Some(other) => Cow::Owned(other.to_string()),
    }
}

async fn write_dataset(dataset: &MergedDataset, output_file: &Path) -> Result<(), PipelineError> {
    let json = dataset
        .to_json_pretty()
        .map_err(|e| PipelineError::MergeWriteFailed {
            path: output_file.to_path_buf(),
            detail: e.to_string(),
        })?;

    write_atomic(output_file, json.as_bytes())
        .await
        .map_err(|e| PipelineError::MergeWriteFailed {
            path: output_file.to_path_buf(),
            detail: e.to_string(),
        })
}
