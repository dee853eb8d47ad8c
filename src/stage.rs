//! Running one per-file stage over a whole input tree.
//!
//! [`StageRunner::run`] walks the input root with a [`TreeWalker`], hands
//! every discovered file to an [`IdempotentFileProcessor`], and folds the
//! per-file outcomes into a [`StageSummary`]. Only a stage that cannot start
//! (missing input root, uncreatable output root) returns an error.

use crate::error::PipelineError;
use crate::processor::{FileStatus, FileTransform, IdempotentFileProcessor};
use crate::progress::ProgressCallback;
use crate::walker::TreeWalker;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// Document formats accepted by the parse stage.
pub const PARSE_EXTENSIONS: &[&str] = &[
    ".pdf", ".pptx", ".ppt", ".docx", ".doc", ".txt", ".csv", ".json", ".html", ".xml", ".png",
    ".jpeg", ".jpg",
];

/// Input filter of the extract stage.
pub const MARKDOWN_EXTENSIONS: &[&str] = &[".md"];

/// Input filter of the merge stage.
pub const JSON_EXTENSIONS: &[&str] = &[".json"];

/// The three pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StageKind {
    /// Documents → Markdown.
    Parse,
    /// Markdown → extracted JSON record.
    Extract,
    /// Extracted records → one merged dataset.
    Merge,
}

impl StageKind {
    pub const ALL: [StageKind; 3] = [StageKind::Parse, StageKind::Extract, StageKind::Merge];

    pub fn name(self) -> &'static str {
        match self {
            StageKind::Parse => "parse",
            StageKind::Extract => "extract",
            StageKind::Merge => "merge",
        }
    }

    /// 1-based position in the pipeline.
    pub fn step(self) -> usize {
        match self {
            StageKind::Parse => 1,
            StageKind::Extract => 2,
            StageKind::Merge => 3,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            StageKind::Parse => "Converting documents to Markdown",
            StageKind::Extract => "Converting Markdown to JSON",
            StageKind::Merge => "Merging JSON files",
        }
    }

    pub fn accepted_extensions(self) -> &'static [&'static str] {
        match self {
            StageKind::Parse => PARSE_EXTENSIONS,
            StageKind::Extract => MARKDOWN_EXTENSIONS,
            StageKind::Merge => JSON_EXTENSIONS,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Aggregated per-file outcomes of one stage run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageSummary {
    /// Files that passed the extension filter.
    pub discovered_count: usize,
    /// Files transformed and written in this run.
    pub processed_count: usize,
    /// Files whose output already existed.
    pub skipped_count: usize,
    /// Files that failed; their siblings were still processed.
    pub failed_count: usize,
}

impl StageSummary {
    pub fn record(&mut self, status: &FileStatus) {
        match status {
            FileStatus::Success => self.processed_count += 1,
            FileStatus::Skipped(_) => self.skipped_count += 1,
            FileStatus::Failed(_) => self.failed_count += 1,
        }
    }

    /// No input file matched the stage's filter.
    pub fn is_empty(&self) -> bool {
        self.discovered_count == 0
    }
}

/// Drives a [`FileTransform`] over every matching file of an input tree.
pub struct StageRunner {
    stage: StageKind,
    progress: Option<ProgressCallback>,
}

impl StageRunner {
    pub fn new(stage: StageKind) -> Self {
        Self {
            stage,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn stage(&self) -> StageKind {
        self.stage
    }

    /// Run the stage over `input_root`, writing into `output_root`.
    ///
    /// Files are processed one at a time in walk order.
    ///
    /// # Errors
    /// [`PipelineError::StageStartup`] when `input_root` is missing or not a
    /// directory, [`PipelineError::OutputDirCreate`] when `output_root`
    /// cannot be created. Per-file failures are counted, never returned.
    pub async fn run(
        &self,
        input_root: &Path,
        output_root: &Path,
        accepted_extensions: &[&str],
        transform: &dyn FileTransform,
    ) -> Result<StageSummary, PipelineError> {
        check_input_root(self.stage, input_root).await?;
        tokio::fs::create_dir_all(output_root)
            .await
            .map_err(|e| PipelineError::OutputDirCreate {
                path: output_root.to_path_buf(),
                source: e,
            })?;

        info!(
            "Starting to process files from {} to {}",
            input_root.display(),
            output_root.display()
        );

        let walker = TreeWalker::new(input_root, accepted_extensions);
        let records: Vec<_> = walker.walk().collect();
        let processor = IdempotentFileProcessor::new(output_root, transform.output_naming());

        let mut summary = StageSummary {
            discovered_count: records.len(),
            ..Default::default()
        };

        if let Some(ref cb) = self.progress {
            cb.on_stage_start(self.stage, records.len());
        }

        if records.is_empty() {
            warn_no_files(self.stage, input_root, accepted_extensions);
        }

        for (i, record) in records.iter().enumerate() {
            if let Some(ref cb) = self.progress {
                cb.on_file_start(self.stage, &record.relative_path, i + 1, records.len());
            }

            let result = processor.process(record, transform).await;
            summary.record(&result.status);

            if let Some(ref cb) = self.progress {
                match &result.status {
                    FileStatus::Failed(e) => {
                        cb.on_file_error(self.stage, &result.relative_path, &e.to_string())
                    }
                    status => cb.on_file_complete(self.stage, &result.relative_path, status),
                }
            }
        }

        if !summary.is_empty() {
            info!(
                "Stage {}: {} files found, {} processed, {} skipped, {} failed",
                self.stage,
                summary.discovered_count,
                summary.processed_count,
                summary.skipped_count,
                summary.failed_count
            );
        }

        if let Some(ref cb) = self.progress {
            cb.on_stage_complete(self.stage, &summary);
        }

        Ok(summary)
    }
}

/// Fail the stage unless `input_root` is an existing directory.
pub(crate) async fn check_input_root(stage: StageKind, input_root: &Path) -> Result<(), PipelineError> {
    match tokio::fs::metadata(input_root).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(PipelineError::StageStartup {
            stage: stage.name().to_string(),
            reason: format!("input root '{}' is not a directory", input_root.display()),
        }),
        Err(e) => Err(PipelineError::StageStartup {
            stage: stage.name().to_string(),
            reason: format!("cannot read input root '{}': {}", input_root.display(), e),
        }),
    }
}

/// Operator diagnostic for a stage whose input filter matched nothing.
pub(crate) fn warn_no_files(stage: StageKind, input_root: &Path, accepted_extensions: &[&str]) {
    warn!(
        "Stage {}: no matching files were found in {}. Please check that the input directory \
         path is correct, that files of the accepted types ({}) exist in it, and that they are \
         readable.",
        stage,
        input_root.display(),
        accepted_extensions.join(" ")
    );
}
