//! Progress-callback trait for per-file stage events.
//!
//! Inject an [`Arc<dyn StageProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as each stage walks its input tree. The CLI uses it to drive a
//! terminal progress bar; library callers can forward events anywhere.
//!
//! # Example
//!
//! ```rust
//! use deed2json::{FileStatus, PipelineConfig, StageKind, StageProgressCallback};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     written: AtomicUsize,
//! }
//!
//! impl StageProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, _stage: StageKind, _path: &Path, status: &FileStatus) {
//!         if matches!(status, FileStatus::Success) {
//!             self.written.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { written: AtomicUsize::new(0) });
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn StageProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::processor::FileStatus;
use crate::stage::{StageKind, StageSummary};
use std::path::Path;
use std::sync::Arc;

/// Called by the stage runner as it processes each file.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Files are processed sequentially, but the trait is
/// `Send + Sync` so a callback can be shared with other tasks.
pub trait StageProgressCallback: Send + Sync {
    /// Called once per stage, after discovery and before the first file.
    fn on_stage_start(&self, stage: StageKind, total_files: usize) {
        let _ = (stage, total_files);
    }

    /// Called just before a file is checked and, if needed, transformed.
    ///
    /// `index` is 1-based.
    fn on_file_start(&self, stage: StageKind, relative_path: &Path, index: usize, total: usize) {
        let _ = (stage, relative_path, index, total);
    }

    /// Called when a file was written or skipped because its output exists.
    fn on_file_complete(&self, stage: StageKind, relative_path: &Path, status: &FileStatus) {
        let _ = (stage, relative_path, status);
    }

    /// Called when a file failed. The stage continues with the next file.
    fn on_file_error(&self, stage: StageKind, relative_path: &Path, error: &str) {
        let _ = (stage, relative_path, error);
    }

    /// Called once after every discovered file has been attempted.
    fn on_stage_complete(&self, stage: StageKind, summary: &StageSummary) {
        let _ = (stage, summary);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl StageProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn StageProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl StageProgressCallback for TrackingCallback {
        fn on_file_start(&self, _stage: StageKind, _path: &Path, _index: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_complete(&self, _stage: StageKind, _path: &Path, _status: &FileStatus) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_error(&self, _stage: StageKind, _path: &Path, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(StageKind::Parse, 2);
        cb.on_file_start(StageKind::Parse, Path::new("a.pdf"), 1, 2);
        cb.on_file_complete(StageKind::Parse, Path::new("a.pdf"), &FileStatus::Success);
        cb.on_file_error(StageKind::Parse, Path::new("b.pdf"), "boom");
        cb.on_stage_complete(StageKind::Parse, &StageSummary::default());
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_file_start(StageKind::Extract, Path::new("a.md"), 1, 2);
        tracker.on_file_complete(StageKind::Extract, Path::new("a.md"), &FileStatus::Success);
        tracker.on_file_start(StageKind::Extract, Path::new("b.md"), 2, 2);
        tracker.on_file_error(StageKind::Extract, Path::new("b.md"), "not JSON");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }
}
