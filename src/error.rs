//! Error types for the deed2json library.
//!
//! Two error types mirror the two failure scopes of a batch run:
//!
//! * [`PipelineError`] — **Fatal**: a stage (or the whole pipeline) cannot
//!   run at all. Missing input directory, unwritable output root, no model
//!   provider configured. Returned as `Err(PipelineError)` and halts every
//!   stage that has not started yet.
//!
//! * [`FileError`] — **Non-fatal**: one document failed (unsupported format,
//!   model call exhausted its retries, reply was not JSON, disk write failed).
//!   The processor logs it, records it in the file's
//!   [`crate::processor::StageResult`], and moves on to the next file.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors that stop a stage or the pipeline.
///
/// Per-file failures use [`FileError`] and never surface here.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// The configured input directory does not exist.
    #[error("Input directory does not exist: '{path}'\nCheck --input-dir or INPUT_DIR.")]
    InputDirMissing { path: PathBuf },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Stage errors ──────────────────────────────────────────────────────
    /// A stage could not start: its input root is missing or not a directory.
    #[error("Stage '{stage}' could not start: {reason}")]
    StageStartup { stage: String, reason: String },

    /// An output root could not be created.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The merged dataset could not be serialised or written.
    #[error("Failed to write merged file '{path}': {detail}")]
    MergeWriteFailed { path: PathBuf, detail: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single document.
///
/// Stored in [`crate::processor::FileStatus::Failed`]; the stage continues
/// with the next file.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum FileError {
    /// The parser has no way to read this file type.
    #[error("unsupported document format '.{extension}'")]
    UnsupportedFormat { extension: String },

    /// The document could be opened but its content is unusable.
    #[error("could not read document content: {detail}")]
    Unreadable { detail: String },

    /// PDF page rasterisation failed.
    #[error("page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// Model call failed after retries.
    #[error("model call failed after {retries} retries: {detail}")]
    LlmFailed { retries: u32, detail: String },

    /// Model call timed out.
    #[error("model call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Model reply could not be turned into a JSON object.
    #[error("model reply is not a JSON object: {detail}")]
    InvalidJson { detail: String },

    /// Extracted keys fall outside the deed vocabulary and validation is strict.
    #[error("unexpected fields in extracted record: {}", keys.join(", "))]
    UnexpectedFields { keys: Vec<String> },

    /// Reading the input or writing the output failed.
    #[error("I/O error on '{path}': {detail}")]
    Io { path: PathBuf, detail: String },
}

impl FileError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        FileError::Io {
            path: path.into(),
            detail: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_dir_missing_display() {
        let e = PipelineError::InputDirMissing {
            path: PathBuf::from("/data/in"),
        };
        let msg = e.to_string();
        assert!(msg.contains("/data/in"), "got: {msg}");
    }

    #[test]
    fn stage_startup_display() {
        let e = PipelineError::StageStartup {
            stage: "extract".into(),
            reason: "input root is not a directory".into(),
        };
        assert!(e.to_string().contains("extract"));
        assert!(e.to_string().contains("not a directory"));
    }

    #[test]
    fn unexpected_fields_lists_keys() {
        let e = FileError::UnexpectedFields {
            keys: vec!["foo".into(), "bar".into()],
        };
        assert_eq!(e.to_string(), "unexpected fields in extracted record: foo, bar");
    }

    #[test]
    fn unsupported_format_display() {
        let e = FileError::UnsupportedFormat {
            extension: "doc".into(),
        };
        assert!(e.to_string().contains(".doc"));
    }

    #[test]
    fn io_helper_keeps_path() {
        let e = FileError::io("/tmp/x.md", "disk full");
        assert!(e.to_string().contains("/tmp/x.md"));
        assert!(e.to_string().contains("disk full"));
    }
}
