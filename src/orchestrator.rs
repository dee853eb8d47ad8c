//! Whole-pipeline driver: parse → extract → merge.
//!
//! ## State machine
//!
//! Every stage moves `NotStarted → Running → Completed | Failed`. Stages run
//! strictly in order; the first stage to fail halts the run and every later
//! stage stays `NotStarted`. The pipeline succeeded iff every stage is
//! `Completed`.
//!
//! A stage fails when it cannot start (missing input root, uncreatable
//! output root) or when a configured policy trips:
//! [`StageFailurePolicy::FailOnAnyFile`] with at least one failed file, or
//! [`EmptyInputPolicy::Fail`] with no input files at all.
//!
//! ## Why in-process stages?
//!
//! Each stage reads its input root from the same typed [`PipelineConfig`]
//! the previous stage wrote to, so the hand-off directory can never drift
//! between stages the way environment variables can.

use crate::config::{EmptyInputPolicy, PipelineConfig, StageFailurePolicy};
use crate::error::PipelineError;
use crate::merge::Merger;
use crate::pipeline::extractor::LlmTextExtractor;
use crate::pipeline::parser::VisionDocumentParser;
use crate::pipeline::{DocumentParser, TextExtractor};
use crate::processor::FileTransform;
use crate::provider::resolve_provider;
use crate::stage::{StageKind, StageRunner, StageSummary};
use crate::transforms::{ExtractTransform, ParseTransform};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Lifecycle of one stage within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StageState {
    NotStarted,
    Running,
    Completed,
    Failed,
}

/// Outcome of one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: StageKind,
    pub state: StageState,
    pub summary: StageSummary,
    /// Why the stage failed; `None` unless `state` is `Failed`.
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl StageReport {
    fn not_started(stage: StageKind) -> Self {
        Self {
            stage,
            state: StageState::NotStarted,
            summary: StageSummary::default(),
            error: None,
            duration_ms: 0,
        }
    }
}

/// Outcome of a full pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// One report per stage, in pipeline order.
    pub stages: Vec<StageReport>,
    /// Records in the merged file, when one was written.
    pub merged_records: Option<usize>,
    pub merged_file: PathBuf,
    pub total_duration_ms: u64,
}

impl PipelineReport {
    /// `true` iff every stage completed.
    pub fn success(&self) -> bool {
        self.stages.iter().all(|s| s.state == StageState::Completed)
    }

    pub fn stage(&self, stage: StageKind) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// The stage that halted the run, if any.
    pub fn failed_stage(&self) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.state == StageState::Failed)
    }
}

/// Runs the three stages against one configuration and pair of collaborators.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    parser: Arc<dyn DocumentParser>,
    extractor: Arc<dyn TextExtractor>,
}

impl PipelineOrchestrator {
    /// Orchestrator with injected collaborators.
    pub fn new(
        config: PipelineConfig,
        parser: Arc<dyn DocumentParser>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        Self {
            config,
            parser,
            extractor,
        }
    }

    /// Orchestrator with the model-backed collaborators, sharing one provider.
    ///
    /// # Errors
    /// [`PipelineError::ProviderNotConfigured`] when no provider resolves.
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        let provider = resolve_provider(&config)?;
        let parser = Arc::new(VisionDocumentParser::from_config(Arc::clone(&provider), &config));
        let extractor = Arc::new(LlmTextExtractor::from_config(provider, &config));
        Ok(Self::new(config, parser, extractor))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run parse → extract → merge.
    ///
    /// A stage failure is reported in the returned [`PipelineReport`], not as
    /// an error; check [`PipelineReport::success`].
    ///
    /// # Errors
    /// [`PipelineError::InputDirMissing`] when the input directory does not
    /// exist, [`PipelineError::OutputDirCreate`] when an output root cannot
    /// be created. No stage runs in either case.
    pub async fn run(&self) -> Result<PipelineReport, PipelineError> {
        let start = Instant::now();
        info!("Starting land deed processing pipeline");

        self.prepare_directories().await?;

        let mut stages: Vec<StageReport> =
            StageKind::ALL.iter().map(|s| StageReport::not_started(*s)).collect();
        let mut merged_records = None;

        for slot in stages.iter_mut() {
            slot.state = StageState::Running;
            let (report, records) = self.execute(slot.stage).await;
            *slot = report;
            if slot.stage == StageKind::Merge {
                merged_records = records;
            }
            if slot.state == StageState::Failed {
                error!(
                    "Pipeline failed at step {} ({}): {}",
                    slot.stage.step(),
                    slot.stage,
                    slot.error.as_deref().unwrap_or("unknown error")
                );
                break;
            }
        }

        let report = PipelineReport {
            stages,
            merged_records,
            merged_file: self.config.merged_file_path(),
            total_duration_ms: start.elapsed().as_millis() as u64,
        };

        if report.success() {
            info!("Pipeline completed successfully!");
        }
        Ok(report)
    }

    /// Run one stage on its own, e.g. to redo extraction after a prompt change.
    ///
    /// Unlike [`Self::run`], a missing input root is reported as a failed
    /// stage rather than an error.
    pub async fn run_stage(&self, stage: StageKind) -> StageReport {
        self.execute(stage).await.0
    }

    async fn prepare_directories(&self) -> Result<(), PipelineError> {
        let c = &self.config;
        match tokio::fs::metadata(&c.input_dir).await {
            Ok(meta) if meta.is_dir() => {}
            _ => {
                return Err(PipelineError::InputDirMissing {
                    path: c.input_dir.clone(),
                })
            }
        }

        for dir in [&c.parsed_md_dir, &c.output_json_dir, &c.merged_json_dir] {
            create_dir(dir).await?;
        }
        Ok(())
    }

    /// Execute one stage and decide its final state.
    ///
    /// Also returns the merged record count for the merge stage.
    async fn execute(&self, stage: StageKind) -> (StageReport, Option<usize>) {
        let start = Instant::now();
        info!("Step {}: {}...", stage.step(), stage.description());

        let mut merged_records = None;
        let result = match stage {
            StageKind::Parse => {
                self.run_files(
                    stage,
                    &self.config.input_dir,
                    &self.config.parsed_md_dir,
                    &ParseTransform::new(Arc::clone(&self.parser)),
                )
                .await
                .map(|summary| (summary, summary.is_empty()))
            }
            StageKind::Extract => {
                self.run_files(
                    stage,
                    &self.config.parsed_md_dir,
                    &self.config.output_json_dir,
                    &ExtractTransform::new(Arc::clone(&self.extractor), self.config.schema_validation),
                )
                .await
                .map(|summary| (summary, summary.is_empty()))
            }
            StageKind::Merge => Merger::new(self.config.sort_key.clone())
                .with_progress(self.config.progress_callback.clone())
                .merge(&self.config.output_json_dir, &self.config.merged_file_path())
                .await
                .map(|outcome| {
                    merged_records = outcome.dataset.as_ref().map(|d| d.total_records);
                    // Files that all failed to load leave nothing to merge.
                    (outcome.summary, outcome.dataset.is_none())
                }),
        };

        let (state, summary, error) = match result {
            Ok((summary, empty)) => match self.policy_violation(&summary, empty) {
                Some(reason) => (StageState::Failed, summary, Some(reason)),
                None => (StageState::Completed, summary, None),
            },
            Err(e) => (StageState::Failed, StageSummary::default(), Some(e.to_string())),
        };

        if state == StageState::Completed {
            info!("Step {} ({}) completed successfully", stage.step(), stage);
        }

        let report = StageReport {
            stage,
            state,
            summary,
            error,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        (report, merged_records)
    }

    async fn run_files(
        &self,
        stage: StageKind,
        input_root: &Path,
        output_root: &Path,
        transform: &dyn FileTransform,
    ) -> Result<StageSummary, PipelineError> {
        StageRunner::new(stage)
            .with_progress(self.config.progress_callback.clone())
            .run(input_root, output_root, stage.accepted_extensions(), transform)
            .await
    }

    /// Reason a successful stage run still counts as failed, if any.
    ///
    /// `empty` means the stage had nothing to work on: no input matched, or
    /// for the merge stage, no record could be loaded.
    fn policy_violation(&self, summary: &StageSummary, empty: bool) -> Option<String> {
        if empty && self.config.empty_input_policy == EmptyInputPolicy::Fail {
            return Some(if summary.is_empty() {
                "no input files found".to_string()
            } else {
                format!("none of {} input file(s) could be used", summary.discovered_count)
            });
        }
        if summary.failed_count > 0 && self.config.failure_policy == StageFailurePolicy::FailOnAnyFile {
            return Some(format!("{} file(s) failed", summary.failed_count));
        }
        None
    }
}

async fn create_dir(dir: &Path) -> Result<(), PipelineError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| PipelineError::OutputDirCreate {
            path: dir.to_path_buf(),
            source: e,
        })
}
