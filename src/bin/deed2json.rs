//! CLI binary for deed2json.
//!
//! A thin shim over the library crate that maps CLI flags (and the
//! environment / `.env` file) to `PipelineConfig`, runs the pipeline and
//! turns its report into an exit status.

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use deed2json::{
    EmptyInputPolicy, FileStatus, PipelineConfig, PipelineOrchestrator, PipelineReport,
    ProgressCallback, SchemaValidation, StageFailurePolicy, StageKind, StageProgressCallback,
    StageReport, StageState, StageSummary,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar reused across the three stages, with a
/// log line per file printed above it.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Scanning input…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl StageProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: StageKind, total_files: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_style(style);
        self.bar.set_length(total_files as u64);
        self.bar.set_position(0);
        self.bar.set_prefix(format!("Step {} {}", stage.step(), stage));
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Step {}: {} ({} files)",
                stage.step(),
                stage.description(),
                total_files
            ))
        ));
    }

    fn on_file_start(&self, _stage: StageKind, relative_path: &Path, _index: usize, _total: usize) {
        self.bar.set_message(relative_path.display().to_string());
    }

    fn on_file_complete(&self, _stage: StageKind, relative_path: &Path, status: &FileStatus) {
        let line = match status {
            FileStatus::Skipped(_) => format!(
                "  {} {}  {}",
                dim("↷"),
                relative_path.display(),
                dim("exists")
            ),
            _ => format!("  {} {}", green("✓"), relative_path.display()),
        };
        self.bar.println(line);
        self.bar.inc(1);
    }

    fn on_file_error(&self, _stage: StageKind, relative_path: &Path, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {}  {}",
            red("✗"),
            relative_path.display(),
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_stage_complete(&self, stage: StageKind, summary: &StageSummary) {
        self.bar.println(format!(
            "  {} {}",
            dim(&format!("{stage}:")),
            dim(&summary_line(summary))
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the whole pipeline on the default ./data layout
  deed2json

  # Custom input tree, strict failure handling
  deed2json --input-dir ./scans --fail-on-any-file

  # Redo only the extraction stage (e.g. after a prompt change)
  deed2json --stage extract --extraction-prompt prompts/deed.txt

  # Keep a timestamped log file next to the data
  deed2json --log-dir ./logs

DIRECTORY LAYOUT (defaults):
  ./data/data-input         documents to convert (.pdf .png .jpg .docx .pptx .txt …)
  ./data/data-parsed-md     stage 1 output: <name>_parsed.md, mirrored tree
  ./data/data-output-json   stage 2 output: <name>_parsed.json, mirrored tree
  ./data/json-merge         stage 3 output: merged_land_deeds.json

  Files whose output already exists are skipped, so an interrupted run can
  simply be started again.

ENVIRONMENT VARIABLES (also read from a .env file):
  INPUT_DIR, PARSED_MD_DIR, OUTPUT_JSON_DIR, MERGED_JSON_DIR
                          Directory overrides
  OPENAI_API_KEY          OpenAI API key
  OPENAI_MODEL            Model ID (default: gpt-4o)
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID (with EDGEQUAKE_LLM_PROVIDER)
  PDFIUM_LIB_PATH         Path to libpdfium, when not installed system-wide
  RUST_LOG                Log filter, overrides --verbose / --quiet

EXIT STATUS:
  0  every stage completed
  1  a stage failed or the configuration is invalid
"#;

/// Convert scanned land deeds into one merged JSON dataset.
#[derive(Parser, Debug)]
#[command(
    name = "deed2json",
    version,
    about = "Convert scanned land deeds into one merged JSON dataset",
    long_about = "Runs a three-stage pipeline over a directory tree of land-deed documents: \
parse every document to Markdown with a vision model, extract the deed fields of each \
Markdown file to JSON, and merge all records into one dataset sorted by deed number.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Root of the documents to convert.
    #[arg(long, env = "INPUT_DIR", default_value = "./data/data-input")]
    input_dir: PathBuf,

    /// Stage 1 output root (parsed Markdown).
    #[arg(long, env = "PARSED_MD_DIR", default_value = "./data/data-parsed-md")]
    parsed_md_dir: PathBuf,

    /// Stage 2 output root (extracted JSON records).
    #[arg(long, env = "OUTPUT_JSON_DIR", default_value = "./data/data-output-json")]
    output_json_dir: PathBuf,

    /// Stage 3 output root (merged dataset).
    #[arg(long, env = "MERGED_JSON_DIR", default_value = "./data/json-merge")]
    merged_json_dir: PathBuf,

    /// File name of the merged dataset.
    #[arg(long, env = "DEED2JSON_MERGED_FILE", default_value = deed2json::config::DEFAULT_MERGED_FILE_NAME)]
    merged_file_name: String,

    /// Field the merged records are sorted by.
    #[arg(long, env = "DEED2JSON_SORT_KEY", default_value = deed2json::config::DEFAULT_SORT_KEY)]
    sort_key: String,

    /// Run only this stage instead of the whole pipeline.
    #[arg(long, value_enum)]
    stage: Option<StageArg>,

    /// Fail a stage when any of its files fails.
    #[arg(long, env = "DEED2JSON_FAIL_ON_ANY_FILE")]
    fail_on_any_file: bool,

    /// Fail a stage that finds no input files.
    #[arg(long, env = "DEED2JSON_FAIL_ON_EMPTY")]
    fail_on_empty: bool,

    /// Check extracted keys against the deed fields: off, warn, reject.
    #[arg(long, env = "DEED2JSON_SCHEMA_VALIDATION", value_enum, default_value = "off")]
    schema_validation: ValidationArg,

    /// LLM model ID (e.g. gpt-4o, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "OPENAI_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI for PDF pages (72–400).
    #[arg(long, env = "DEED2JSON_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Concurrent page calls within one document.
    #[arg(short, long, env = "DEED2JSON_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Max LLM output tokens per call.
    #[arg(long, env = "DEED2JSON_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "DEED2JSON_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per LLM call.
    #[arg(long, env = "DEED2JSON_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per LLM call timeout in seconds.
    #[arg(long, env = "DEED2JSON_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Text file replacing the stage 1 parsing instruction.
    #[arg(long, env = "DEED2JSON_PARSING_PROMPT")]
    parsing_prompt: Option<PathBuf>,

    /// Text file replacing the stage 2 extraction prompt.
    #[arg(long, env = "DEED2JSON_EXTRACTION_PROMPT")]
    extraction_prompt: Option<PathBuf>,

    /// Also write logs to pipeline_YYYYMMDD_HHMMSS.log in this directory.
    #[arg(long, env = "DEED2JSON_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Print the run report as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DEED2JSON_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DEED2JSON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DEED2JSON_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum StageArg {
    Parse,
    Extract,
    Merge,
}

impl From<StageArg> for StageKind {
    fn from(v: StageArg) -> Self {
        match v {
            StageArg::Parse => StageKind::Parse,
            StageArg::Extract => StageKind::Extract,
            StageArg::Merge => StageKind::Merge,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ValidationArg {
    Off,
    Warn,
    Reject,
}

impl From<ValidationArg> for SchemaValidation {
    fn from(v: ValidationArg) -> Self {
        match v {
            ValidationArg::Off => SchemaValidation::Off,
            ValidationArg::Warn => SchemaValidation::Warn,
            ValidationArg::Reject => SchemaValidation::Reject,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Values from .env become visible to clap's `env = ...` lookups.
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let log_file = init_logging(&cli, show_progress)?;
    if let Some(ref path) = log_file {
        tracing::info!("Logging to {}", path.display());
    }

    let progress = if show_progress {
        Some(CliProgressCallback::new())
    } else {
        None
    };

    let config = build_config(
        &cli,
        progress.clone().map(|cb| cb as ProgressCallback),
    )
    .await?;
    let orchestrator =
        PipelineOrchestrator::from_config(config).context("Failed to set up the LLM provider")?;

    let success = match cli.stage {
        Some(stage) => {
            let report = orchestrator.run_stage(stage.into()).await;
            if let Some(ref cb) = progress {
                cb.finish();
            }
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to serialise report")?
                );
            } else if !cli.quiet {
                print_stage(&report);
            }
            report.state == StageState::Completed
        }
        None => {
            let result = orchestrator.run().await;
            if let Some(ref cb) = progress {
                cb.finish();
            }
            let report = result.context("Pipeline could not start")?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to serialise report")?
                );
            } else if !cli.quiet {
                print_report(&report);
            }
            report.success()
        }
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

/// Install the stderr subscriber and, with `--log-dir`, a plain-text file layer.
///
/// Returns the log file path when one was opened.
fn init_logging(cli: &Cli, show_progress: bool) -> Result<Option<PathBuf>> {
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let console_level = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    let console = fmt::layer().with_writer(io::stderr).with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(console_level)),
    );

    let (file_layer, log_path) = match cli.log_dir {
        Some(ref dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let path = dir.join(format!(
                "pipeline_{}.log",
                Local::now().format("%Y%m%d_%H%M%S")
            ));
            let file = File::create(&path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(EnvFilter::new(if cli.verbose { "debug" } else { "info" }));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .init();

    Ok(log_path)
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .input_dir(&cli.input_dir)
        .parsed_md_dir(&cli.parsed_md_dir)
        .output_json_dir(&cli.output_json_dir)
        .merged_json_dir(&cli.merged_json_dir)
        .merged_file_name(&cli.merged_file_name)
        .sort_key(&cli.sort_key)
        .failure_policy(if cli.fail_on_any_file {
            StageFailurePolicy::FailOnAnyFile
        } else {
            StageFailurePolicy::FailOpen
        })
        .empty_input_policy(if cli.fail_on_empty {
            EmptyInputPolicy::Fail
        } else {
            EmptyInputPolicy::Succeed
        })
        .schema_validation(cli.schema_validation.into())
        .dpi(cli.dpi)
        .page_concurrency(cli.concurrency)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref path) = cli.parsing_prompt {
        builder = builder.parsing_instruction(read_prompt(path).await?);
    }
    if let Some(ref path) = cli.extraction_prompt {
        builder = builder.extraction_prompt(read_prompt(path).await?);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn read_prompt(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read prompt from {}", path.display()))
}

fn summary_line(s: &StageSummary) -> String {
    format!(
        "{} found, {} processed, {} skipped, {} failed",
        s.discovered_count, s.processed_count, s.skipped_count, s.failed_count
    )
}

fn print_stage(report: &StageReport) {
    let mark = match report.state {
        StageState::Completed if report.summary.failed_count > 0 => yellow("⚠"),
        StageState::Completed => green("✔"),
        StageState::Failed => red("✘"),
        StageState::NotStarted | StageState::Running => dim("·"),
    };
    let detail = match report.state {
        StageState::NotStarted => dim("not started"),
        StageState::Failed => red(report.error.as_deref().unwrap_or("failed")),
        _ => summary_line(&report.summary),
    };
    eprintln!(
        "{} {:<8} {}  {}",
        mark,
        bold(report.stage.name()),
        detail,
        dim(&format!("{}ms", report.duration_ms))
    );
}

fn print_report(report: &PipelineReport) {
    for stage in &report.stages {
        print_stage(stage);
    }
    match report.merged_records {
        Some(n) => eprintln!(
            "{}  {} records  →  {}",
            if report.success() { green("✔") } else { yellow("⚠") },
            bold(&n.to_string()),
            bold(&report.merged_file.display().to_string())
        ),
        None if report.success() => {
            eprintln!("{}  no records to merge", yellow("⚠"))
        }
        None => {}
    }
}
