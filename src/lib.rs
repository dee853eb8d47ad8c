//! # deed2json
//!
//! Turn folders of scanned Thai land deeds into one sorted JSON dataset.
//!
//! ## Why this crate?
//!
//! Deed scans arrive as a mix of PDFs, photos and Office files, nested in
//! whatever folder layout the surveyor used. Reading them by hand does not
//! scale, and a one-shot script that dies on file 412 of 900 wastes every
//! model call it already paid for. This crate runs the work as three
//! resumable stages over mirrored directory trees: every file that already
//! has an output is skipped, and one bad document never stops its siblings.
//!
//! ## Pipeline Overview
//!
//! ```text
//! data-input/a/b/c.pdf
//!  │
//!  ├─ 1. Parse    vision model reads every page ──▶ data-parsed-md/a/b/c_parsed.md
//!  ├─ 2. Extract  chat model fills the deed fields ─▶ data-output-json/a/b/c_parsed.json
//!  └─ 3. Merge    tag, sort, write once ─────────▶ json-merge/merged_land_deeds.json
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use deed2json::{PipelineConfig, PipelineOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = PipelineConfig::builder().input_dir("./scans").build()?;
//!     let report = PipelineOrchestrator::from_config(config)?.run().await?;
//!     eprintln!("merged {:?} records", report.merged_records);
//!     std::process::exit(if report.success() { 0 } else { 1 });
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `deed2json` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod merge;
pub mod orchestrator;
pub mod pipeline;
pub mod processor;
pub mod progress;
pub mod prompts;
pub mod provider;
pub mod stage;
pub mod transforms;
pub mod walker;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    EmptyInputPolicy, PipelineConfig, PipelineConfigBuilder, SchemaValidation, StageFailurePolicy,
};
pub use error::{FileError, PipelineError};
pub use merge::{ExtractedRecord, MergeOutcome, MergedDataset, Merger};
pub use orchestrator::{PipelineOrchestrator, PipelineReport, StageReport, StageState};
pub use pipeline::extractor::LlmTextExtractor;
pub use pipeline::parser::VisionDocumentParser;
pub use pipeline::{DocumentParser, ParsedPage, TextExtractor};
pub use processor::{FileStatus, FileTransform, IdempotentFileProcessor, OutputNaming, SkipReason, StageResult};
pub use progress::{NoopProgressCallback, ProgressCallback, StageProgressCallback};
pub use stage::{StageKind, StageRunner, StageSummary};
pub use walker::{DocumentRecord, TreeWalker};
