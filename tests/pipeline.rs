//! End-to-end pipeline tests with in-memory collaborators (no network).
//!
//! The fake parser treats each input file's text as the deed number; a file
//! containing `CORRUPT` fails to parse. The fake extractor reads the deed
//! number back out of the parsed Markdown.

use async_trait::async_trait;
use deed2json::{
    DocumentParser, EmptyInputPolicy, ExtractedRecord, FileError, FileStatus, Merger, ParsedPage,
    PipelineConfig, PipelineError, PipelineOrchestrator, StageFailurePolicy, StageKind,
    StageProgressCallback, StageState, StageSummary, TextExtractor,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const DEED_KEY: &str = "เลขโฉนดที่ดิน";

// ── Test doubles ─────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeParser {
    calls: AtomicUsize,
}

#[async_trait]
impl DocumentParser for FakeParser {
    async fn parse(&self, path: &Path) -> Result<Vec<ParsedPage>, FileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| FileError::Io {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;
        if text.contains("CORRUPT") {
            return Err(FileError::Unreadable {
                detail: "corrupt scan".into(),
            });
        }
        Ok(vec![ParsedPage {
            page_num: 1,
            markdown: format!("{DEED_KEY}: {}\n", text.trim()),
        }])
    }
}

#[derive(Default)]
struct FakeExtractor {
    calls: AtomicUsize,
}

#[async_trait]
impl TextExtractor for FakeExtractor {
    async fn extract(&self, markdown: &str) -> Result<ExtractedRecord, FileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prefix = format!("{DEED_KEY}: ");
        let mut record = ExtractedRecord::new();
        if let Some(line) = markdown.lines().find(|l| l.starts_with(&prefix)) {
            record.insert(
                DEED_KEY.to_string(),
                Value::String(line[prefix.len()..].to_string()),
            );
        }
        record.insert("จังหวัด".to_string(), Value::String("กรุงเทพมหานคร".into()));
        Ok(record)
    }
}

#[derive(Default)]
struct CountingProgress {
    stages_started: AtomicUsize,
    files_ok: AtomicUsize,
    files_failed: AtomicUsize,
}

impl StageProgressCallback for CountingProgress {
    fn on_stage_start(&self, _stage: StageKind, _total_files: usize) {
        self.stages_started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_file_complete(&self, _stage: StageKind, _path: &Path, status: &FileStatus) {
        if matches!(status, FileStatus::Success) {
            self.files_ok.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn on_file_error(&self, _stage: StageKind, _path: &Path, _error: &str) {
        self.files_failed.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Fixture ──────────────────────────────────────────────────────────────

struct Workspace {
    _tmp: TempDir,
    input: PathBuf,
    parsed: PathBuf,
    json: PathBuf,
    merged: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().to_path_buf();
        let ws = Self {
            input: root.join("data-input"),
            parsed: root.join("data-parsed-md"),
            json: root.join("data-output-json"),
            merged: root.join("json-merge"),
            _tmp: tmp,
        };
        std::fs::create_dir_all(&ws.input).unwrap();
        ws
    }

    fn add(&self, rel: &str, body: &str) {
        let path = self.input.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    fn builder(&self) -> deed2json::PipelineConfigBuilder {
        PipelineConfig::builder()
            .input_dir(&self.input)
            .parsed_md_dir(&self.parsed)
            .output_json_dir(&self.json)
            .merged_json_dir(&self.merged)
    }

    fn merged_file(&self) -> PathBuf {
        self.merged.join("merged_land_deeds.json")
    }

    fn merged_json(&self) -> Value {
        serde_json::from_str(&std::fs::read_to_string(self.merged_file()).unwrap()).unwrap()
    }
}

fn orchestrator(
    config: PipelineConfig,
) -> (PipelineOrchestrator, Arc<FakeParser>, Arc<FakeExtractor>) {
    let parser = Arc::new(FakeParser::default());
    let extractor = Arc::new(FakeExtractor::default());
    let orch = PipelineOrchestrator::new(config, parser.clone(), extractor.clone());
    (orch, parser, extractor)
}

fn files_under(root: &Path) -> Vec<String> {
    let mut out: Vec<String> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    out.sort();
    out
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn end_to_end_skips_unsupported_files() {
    let ws = Workspace::new();
    ws.add("deed.pdf", "1001");
    ws.add("setup.exe", "MZ");

    let (orch, _, _) = orchestrator(ws.builder().build().unwrap());
    let report = orch.run().await.unwrap();

    assert!(report.success());
    assert_eq!(files_under(&ws.parsed), vec!["deed_parsed.md"]);
    assert_eq!(files_under(&ws.json), vec!["deed_parsed.json"]);

    let md = std::fs::read_to_string(ws.parsed.join("deed_parsed.md")).unwrap();
    assert!(md.starts_with("# Parsed content from \"deed.pdf\"\n\n# Page 1/1\n\n"));

    let merged = ws.merged_json();
    assert_eq!(merged["total_records"], 1);
    assert_eq!(merged["data"][0][DEED_KEY], "1001");
    assert!(merged["data"][0]["source_file"].as_str().unwrap().ends_with(".json"));
    assert_eq!(report.merged_records, Some(1));
}

#[tokio::test]
async fn zero_input_files_succeeds() {
    let ws = Workspace::new();
    let (orch, parser, _) = orchestrator(ws.builder().build().unwrap());

    let report = orch.run().await.unwrap();

    assert!(report.success());
    for stage in &report.stages {
        assert_eq!(stage.state, StageState::Completed);
        assert_eq!(stage.summary, StageSummary::default());
    }
    assert_eq!(parser.calls.load(Ordering::SeqCst), 0);
    assert!(!ws.merged_file().exists());
    assert_eq!(report.merged_records, None);
}

#[tokio::test]
async fn one_bad_file_does_not_stop_its_siblings() {
    let ws = Workspace::new();
    ws.add("good.pdf", "2002");
    ws.add("bad.pdf", "CORRUPT");
    ws.add("other.png", "3003");

    let (orch, _, _) = orchestrator(ws.builder().build().unwrap());
    let report = orch.run().await.unwrap();

    assert!(report.success());
    let parse = report.stage(StageKind::Parse).unwrap();
    assert_eq!(parse.summary.discovered_count, 3);
    assert_eq!(parse.summary.processed_count, 2);
    assert_eq!(parse.summary.failed_count, 1);
    assert!(!ws.parsed.join("bad_parsed.md").exists());
    assert_eq!(ws.merged_json()["total_records"], 2);
}

#[tokio::test]
async fn rerun_skips_existing_outputs() {
    let ws = Workspace::new();
    ws.add("a.pdf", "1");
    ws.add("sub/b.jpg", "2");

    let (orch, parser, extractor) = orchestrator(ws.builder().build().unwrap());
    orch.run().await.unwrap();
    let md_before = std::fs::read(ws.parsed.join("sub/b_parsed.md")).unwrap();
    let merged_before = std::fs::read(ws.merged_file()).unwrap();

    let report = orch.run().await.unwrap();

    assert!(report.success());
    assert_eq!(parser.calls.load(Ordering::SeqCst), 2);
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
    let parse = report.stage(StageKind::Parse).unwrap();
    assert_eq!(parse.summary.skipped_count, 2);
    assert_eq!(parse.summary.processed_count, 0);
    assert_eq!(std::fs::read(ws.parsed.join("sub/b_parsed.md")).unwrap(), md_before);
    assert_eq!(std::fs::read(ws.merged_file()).unwrap(), merged_before);
}

#[tokio::test]
async fn output_trees_mirror_the_input_tree() {
    let ws = Workspace::new();
    ws.add("a/b/c.pdf", "777");

    let (orch, _, _) = orchestrator(ws.builder().build().unwrap());
    orch.run().await.unwrap();

    assert_eq!(files_under(&ws.parsed), vec!["a/b/c_parsed.md"]);
    assert_eq!(files_under(&ws.json), vec!["a/b/c_parsed.json"]);
    let md = std::fs::read_to_string(ws.parsed.join("a/b/c_parsed.md")).unwrap();
    assert!(md.starts_with("# Parsed content from \"a/b/c.pdf\""));
    assert_eq!(ws.merged_json()["data"][0]["source_file"], "a/b/c_parsed.json");
}

#[tokio::test]
async fn merged_records_are_sorted_and_deterministic() {
    let ws = Workspace::new();
    ws.add("x/one.pdf", "2");
    ws.add("two.pdf", "10");
    ws.add("three.pdf", "1");

    let (orch, _, _) = orchestrator(ws.builder().build().unwrap());
    orch.run().await.unwrap();

    let merged = ws.merged_json();
    let keys: Vec<&str> = merged["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r[DEED_KEY].as_str().unwrap())
        .collect();
    assert_eq!(keys, vec!["1", "10", "2"]);

    let first = std::fs::read(ws.merged_file()).unwrap();
    let again = ws.merged.join("again.json");
    Merger::new(DEED_KEY).merge(&ws.json, &again).await.unwrap();
    assert_eq!(std::fs::read(&again).unwrap(), first);

    let text = String::from_utf8(first).unwrap();
    assert!(text.contains("\"จังหวัด\": \"กรุงเทพมหานคร\""));
}

#[tokio::test]
async fn fail_on_any_file_halts_later_stages() {
    let ws = Workspace::new();
    ws.add("good.pdf", "1");
    ws.add("bad.pdf", "CORRUPT");

    let config = ws
        .builder()
        .failure_policy(StageFailurePolicy::FailOnAnyFile)
        .build()
        .unwrap();
    let (orch, _, extractor) = orchestrator(config);
    let report = orch.run().await.unwrap();

    assert!(!report.success());
    assert_eq!(report.failed_stage().unwrap().stage, StageKind::Parse);
    assert_eq!(report.stage(StageKind::Extract).unwrap().state, StageState::NotStarted);
    assert_eq!(report.stage(StageKind::Merge).unwrap().state, StageState::NotStarted);
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    assert!(!ws.merged_file().exists());
}

#[tokio::test]
async fn empty_input_can_be_made_fatal() {
    let ws = Workspace::new();
    ws.add("notes.exe", "x");

    let config = ws
        .builder()
        .empty_input_policy(EmptyInputPolicy::Fail)
        .build()
        .unwrap();
    let (orch, _, _) = orchestrator(config);
    let report = orch.run().await.unwrap();

    assert!(!report.success());
    assert_eq!(report.failed_stage().unwrap().stage, StageKind::Parse);
}

#[tokio::test]
async fn missing_input_dir_is_a_configuration_error() {
    let ws = Workspace::new();
    let config = ws
        .builder()
        .input_dir(ws.input.join("does-not-exist"))
        .build()
        .unwrap();
    let (orch, parser, _) = orchestrator(config);

    let err = orch.run().await.unwrap_err();

    assert!(matches!(err, PipelineError::InputDirMissing { .. }));
    assert_eq!(parser.calls.load(Ordering::SeqCst), 0);
    assert!(!ws.parsed.exists());
}

#[tokio::test]
async fn single_stage_runs_in_isolation() {
    let ws = Workspace::new();
    ws.add("deed.pdf", "55");
    let (orch, parser, extractor) = orchestrator(ws.builder().build().unwrap());

    // Extract before anything was parsed: its input root does not exist yet.
    let early = orch.run_stage(StageKind::Extract).await;
    assert_eq!(early.state, StageState::Failed);
    assert!(early.error.unwrap().contains("extract"));

    let parse = orch.run_stage(StageKind::Parse).await;
    assert_eq!(parse.state, StageState::Completed);
    assert!(ws.parsed.join("deed_parsed.md").exists());
    assert!(!ws.json.exists());
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);

    let extract = orch.run_stage(StageKind::Extract).await;
    assert_eq!(extract.summary.processed_count, 1);
    assert_eq!(parser.calls.load(Ordering::SeqCst), 1);

    let merge = orch.run_stage(StageKind::Merge).await;
    assert_eq!(merge.state, StageState::Completed);
    assert_eq!(ws.merged_json()["total_records"], 1);
}

#[tokio::test]
async fn progress_events_cover_every_stage() {
    let ws = Workspace::new();
    ws.add("a.pdf", "1");
    ws.add("b.pdf", "CORRUPT");

    let progress = Arc::new(CountingProgress::default());
    let config = ws
        .builder()
        .progress_callback(progress.clone())
        .build()
        .unwrap();
    let (orch, _, _) = orchestrator(config);
    orch.run().await.unwrap();

    assert_eq!(progress.stages_started.load(Ordering::SeqCst), 3);
    // parse a.pdf, extract a_parsed.md, merge a_parsed.json
    assert_eq!(progress.files_ok.load(Ordering::SeqCst), 3);
    assert_eq!(progress.files_failed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn merge_with_no_loadable_record_follows_empty_policy() {
    let ws = Workspace::new();
    std::fs::create_dir_all(&ws.json).unwrap();
    std::fs::write(ws.json.join("broken.json"), "{ not json").unwrap();

    let (lenient, _, _) = orchestrator(ws.builder().build().unwrap());
    let report = lenient.run_stage(StageKind::Merge).await;
    assert_eq!(report.state, StageState::Completed);
    assert_eq!(report.summary.failed_count, 1);

    let config = ws
        .builder()
        .empty_input_policy(EmptyInputPolicy::Fail)
        .build()
        .unwrap();
    let (strict, _, _) = orchestrator(config);
    let report = strict.run_stage(StageKind::Merge).await;

    assert_eq!(report.state, StageState::Failed);
    assert_eq!(report.summary.discovered_count, 1);
    assert!(!ws.merged_file().exists());
}
