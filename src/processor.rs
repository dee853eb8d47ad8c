//! Idempotent per-file processing.
//!
//! [`IdempotentFileProcessor`] owns one stage's output root. For every input
//! file it derives the mirrored output path and:
//!
//! 1. skips the file when that output already exists, without calling the
//!    transform, so re-running a half-finished pipeline only does the
//!    missing work;
//! 2. otherwise runs the stage's [`FileTransform`] and writes the result via
//!    a temp file renamed into place, so an interrupted run never leaves a
//!    truncated file at a path the existence check would treat as done;
//! 3. converts every failure into [`FileStatus::Failed`] instead of
//!    returning an error, so one bad document cannot stop its siblings.

use crate::error::FileError;
use crate::walker::DocumentRecord;
use async_trait::async_trait;
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Suffix appended to an output path while it is being written.
const TMP_SUFFIX: &str = ".tmp";

/// The content-producing half of a stage: one input document in, one output
/// document out.
///
/// Implementations call the external collaborator (document parser, text
/// extractor). They never touch the output tree; the processor does that.
#[async_trait]
pub trait FileTransform: Send + Sync {
    /// How this stage names its output files.
    fn output_naming(&self) -> OutputNaming;

    async fn transform(&self, record: &DocumentRecord) -> Result<String, FileError>;
}

/// Why a file was not processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    AlreadyExists,
}

/// Outcome of one file.
#[derive(Debug, Clone, Serialize)]
pub enum FileStatus {
    Success,
    Skipped(SkipReason),
    Failed(FileError),
}

/// Per-file record produced by [`IdempotentFileProcessor::process`].
#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    pub relative_path: PathBuf,
    pub output_path: PathBuf,
    pub status: FileStatus,
}

/// Stage-specific rule turning an input file name into an output file name.
///
/// The stem (file name minus its last extension) is kept, `suffix` is
/// appended, and `extension` replaces the original extension:
/// `c.pdf` with suffix `_parsed` and extension `md` becomes `c_parsed.md`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNaming {
    suffix: String,
    extension: String,
}

impl OutputNaming {
    /// Swap the extension, keeping the stem unchanged.
    pub fn with_extension(extension: impl Into<String>) -> Self {
        Self {
            suffix: String::new(),
            extension: extension.into().trim_start_matches('.').to_string(),
        }
    }

    /// Append `suffix` to the stem.
    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Output file name for an input path, or `None` when it has no file name.
    pub fn file_name(&self, input: &Path) -> Option<String> {
        let stem = input.file_stem()?.to_string_lossy();
        Some(format!("{}{}.{}", stem, self.suffix, self.extension))
    }
}

/// Mirrors one stage's input tree into its output root, skipping work already done.
#[derive(Debug, Clone)]
pub struct IdempotentFileProcessor {
    output_root: PathBuf,
    naming: OutputNaming,
}

impl IdempotentFileProcessor {
    pub fn new(output_root: impl Into<PathBuf>, naming: OutputNaming) -> Self {
        Self {
            output_root: output_root.into(),
            naming,
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Mirrored output path: `output_root / <relative dir> / <renamed file>`.
    pub fn output_path(&self, relative_path: &Path) -> Option<PathBuf> {
        let file_name = self.naming.file_name(relative_path)?;
        let dir = match relative_path.parent() {
            Some(parent) => self.output_root.join(parent),
            None => self.output_root.clone(),
        };
        Some(dir.join(file_name))
    }

    /// Process one file. Never returns an error; failures are in the status.
    pub async fn process(
        &self,
        record: &DocumentRecord,
        transform: &dyn FileTransform,
    ) -> StageResult {
        let Some(output_path) = self.output_path(&record.relative_path) else {
            let status = FileStatus::Failed(FileError::io(
                &record.relative_path,
                "input path has no file name",
            ));
            return StageResult {
                relative_path: record.relative_path.clone(),
                output_path: self.output_root.clone(),
                status,
            };
        };

        let status = self.process_to(record, transform, &output_path).await;
        if let FileStatus::Failed(ref err) = status {
            warn!("Error processing {}: {}", record.absolute_path.display(), err);
        }

        StageResult {
            relative_path: record.relative_path.clone(),
            output_path,
            status,
        }
    }

    async fn process_to(
        &self,
        record: &DocumentRecord,
        transform: &dyn FileTransform,
        output_path: &Path,
    ) -> FileStatus {
        match tokio::fs::try_exists(output_path).await {
            Ok(true) => {
                debug!("File already exists: {}", output_path.display());
                return FileStatus::Skipped(SkipReason::AlreadyExists);
            }
            Ok(false) => {}
            Err(e) => return FileStatus::Failed(FileError::io(output_path, e)),
        }

        info!("Processing: {}", record.absolute_path.display());

        let content = match transform.transform(record).await {
            Ok(content) => content,
            Err(e) => return FileStatus::Failed(e),
        };

        match write_atomic(output_path, content.as_bytes()).await {
            Ok(()) => {
                info!("Saved output to {}", output_path.display());
                FileStatus::Success
            }
            Err(e) => FileStatus::Failed(FileError::io(output_path, e)),
        }
    }
}

/// Path used for the in-progress write of `path`.
///
/// `c_parsed.md` becomes `c_parsed.md.tmp`, which no stage's extension
/// filter accepts.
pub(crate) fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp: OsString = path.as_os_str().to_owned();
    tmp.push(TMP_SUFFIX);
    PathBuf::from(tmp)
}

/// Write `bytes` to `path` via temp file + rename, creating parent directories.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp_path = tmp_path_for(path);
    let written = tokio::fs::write(&tmp_path, bytes).await;
    discard_tmp_on_err(written, &tmp_path).await?;

    let renamed = tokio::fs::rename(&tmp_path, path).await;
    discard_tmp_on_err(renamed, &tmp_path).await
}

/// Remove a leftover temp file when `result` is an error, then pass it through.
async fn discard_tmp_on_err(result: std::io::Result<()>, tmp_path: &Path) -> std::io::Result<()> {
    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(tmp_path).await {
            debug!("Could not remove {}: {}", tmp_path.display(), e);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Upper {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FileTransform for Upper {
        fn output_naming(&self) -> OutputNaming {
            OutputNaming::with_extension("md")
        }

        async fn transform(&self, record: &DocumentRecord) -> Result<String, FileError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = tokio::fs::read_to_string(&record.absolute_path)
                .await
                .map_err(|e| FileError::io(&record.absolute_path, e))?;
            Ok(text.to_uppercase())
        }
    }

    struct Broken;

    #[async_trait]
    impl FileTransform for Broken {
        fn output_naming(&self) -> OutputNaming {
            OutputNaming::with_extension("md")
        }

        async fn transform(&self, _record: &DocumentRecord) -> Result<String, FileError> {
            Err(FileError::Unreadable {
                detail: "corrupt".into(),
            })
        }
    }

    fn record(root: &Path, rel: &str, body: &str) -> DocumentRecord {
        let abs = root.join(rel);
        std::fs::create_dir_all(abs.parent().unwrap()).unwrap();
        std::fs::write(&abs, body).unwrap();
        DocumentRecord {
            absolute_path: abs,
            relative_path: PathBuf::from(rel),
        }
    }

    #[test]
    fn naming_rules() {
        let md = OutputNaming::with_extension("md").suffix("_parsed");
        assert_eq!(md.file_name(Path::new("a/b/c.pdf")).unwrap(), "c_parsed.md");
        let json = OutputNaming::with_extension(".json");
        assert_eq!(json.file_name(Path::new("c_parsed.md")).unwrap(), "c_parsed.json");
        assert_eq!(json.file_name(Path::new("deed.v2.md")).unwrap(), "deed.v2.json");
    }

    #[test]
    fn output_path_mirrors_relative_dirs() {
        let p = IdempotentFileProcessor::new(
            "/out",
            OutputNaming::with_extension("md").suffix("_parsed"),
        );
        assert_eq!(
            p.output_path(Path::new("a/b/c.pdf")).unwrap(),
            PathBuf::from("/out/a/b/c_parsed.md")
        );
        assert_eq!(
            p.output_path(Path::new("top.pdf")).unwrap(),
            PathBuf::from("/out/top_parsed.md")
        );
    }

    #[test]
    fn tmp_path_appends_suffix() {
        assert_eq!(
            tmp_path_for(Path::new("/out/c_parsed.md")),
            PathBuf::from("/out/c_parsed.md.tmp")
        );
    }

    #[tokio::test]
    async fn second_run_skips_without_calling_transform() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let rec = record(input.path(), "x/deed.txt", "hello");
        let processor = IdempotentFileProcessor::new(output.path(), OutputNaming::with_extension("md"));
        let transform = Upper {
            calls: AtomicUsize::new(0),
        };

        let first = processor.process(&rec, &transform).await;
        assert!(matches!(first.status, FileStatus::Success));
        let written = std::fs::read_to_string(&first.output_path).unwrap();
        assert_eq!(written, "HELLO");

        let second = processor.process(&rec, &transform).await;
        assert!(matches!(
            second.status,
            FileStatus::Skipped(SkipReason::AlreadyExists)
        ));
        assert_eq!(transform.calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read_to_string(&second.output_path).unwrap(), written);
    }

    #[tokio::test]
    async fn failure_leaves_no_output() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let rec = record(input.path(), "bad.txt", "??");
        let processor = IdempotentFileProcessor::new(output.path(), OutputNaming::with_extension("md"));

        let result = processor.process(&rec, &Broken).await;
        assert!(matches!(result.status, FileStatus::Failed(FileError::Unreadable { .. })));
        assert!(!result.output_path.exists());
        assert!(!tmp_path_for(&result.output_path).exists());
    }

    #[tokio::test]
    async fn failed_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = tmp_path_for(&dir.path().join("deed.json"));
        std::fs::write(&tmp, b"{\"partial").unwrap();

        let err = std::io::Error::new(std::io::ErrorKind::StorageFull, "disk full");
        let result = discard_tmp_on_err(Err(err), &tmp).await;

        assert_eq!(result.unwrap_err().kind(), std::io::ErrorKind::StorageFull);
        assert!(!tmp.exists());

        std::fs::write(&tmp, b"kept").unwrap();
        discard_tmp_on_err(Ok(()), &tmp).await.unwrap();
        assert!(tmp.exists());
    }

    #[tokio::test]
    async fn write_atomic_replaces_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/merged.json");
        write_atomic(&path, b"first version, longer").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        assert!(!tmp_path_for(&path).exists());
    }
}
