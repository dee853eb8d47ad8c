//! Configuration types for a deed2json pipeline run.
//!
//! Every knob lives in [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. Stages read their input and output roots from
//! this one typed value, so the parse stage's output root is by construction
//! the extract stage's input root.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default name of the single file written into the merged-JSON root.
pub const DEFAULT_MERGED_FILE_NAME: &str = "merged_land_deeds.json";

/// Default sort key for the merged dataset: the land title deed number.
pub const DEFAULT_SORT_KEY: &str = "เลขโฉนดที่ดิน";

/// Configuration for a pipeline run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use deed2json::{PipelineConfig, StageFailurePolicy};
///
/// let config = PipelineConfig::builder()
///     .input_dir("./scans")
///     .failure_policy(StageFailurePolicy::FailOnAnyFile)
///     .model("gpt-4o")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Root of the documents to convert. Default: `./data/data-input`.
    pub input_dir: PathBuf,

    /// Stage 1 output root, mirrored from `input_dir`. Default: `./data/data-parsed-md`.
    pub parsed_md_dir: PathBuf,

    /// Stage 2 output root, mirrored from `parsed_md_dir`. Default: `./data/data-output-json`.
    pub output_json_dir: PathBuf,

    /// Stage 3 output root; holds exactly one file. Default: `./data/json-merge`.
    pub merged_json_dir: PathBuf,

    /// File name of the merged dataset inside `merged_json_dir`.
    pub merged_file_name: String,

    /// Field the merged records are sorted by. Default: [`DEFAULT_SORT_KEY`].
    pub sort_key: String,

    /// Whether per-file failures fail the stage. Default: [`StageFailurePolicy::FailOpen`].
    pub failure_policy: StageFailurePolicy,

    /// Whether a stage that finds no input files fails. Default: [`EmptyInputPolicy::Succeed`].
    pub empty_input_policy: EmptyInputPolicy,

    /// Checking of extracted keys against the deed vocabulary. Default: off.
    pub schema_validation: SchemaValidation,

    /// LLM model identifier, e.g. "gpt-4o". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for both model calls. Default: 0.1.
    ///
    /// Transcription and field extraction both want the model to stay
    /// faithful to the page, not creative.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 4096.
    pub max_tokens: usize,

    /// Maximum retry attempts on a failed model call. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-model-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Rendering DPI used when rasterising PDF pages. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Maximum rendered image dimension in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Concurrent page-level model calls inside one document. Default: 4.
    ///
    /// Files are always processed one at a time; this only bounds the fan-out
    /// across the pages of a single multi-page PDF.
    pub page_concurrency: usize,

    /// Custom stage 1 instruction. If None, uses [`crate::prompts::DEFAULT_PARSING_INSTRUCTION`].
    pub parsing_instruction: Option<String>,

    /// Custom stage 2 system prompt. If None, uses [`crate::prompts::DEFAULT_EXTRACTION_PROMPT`].
    pub extraction_prompt: Option<String>,

    /// Optional per-file progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("./data/data-input"),
            parsed_md_dir: PathBuf::from("./data/data-parsed-md"),
            output_json_dir: PathBuf::from("./data/data-output-json"),
            merged_json_dir: PathBuf::from("./data/json-merge"),
            merged_file_name: DEFAULT_MERGED_FILE_NAME.to_string(),
            sort_key: DEFAULT_SORT_KEY.to_string(),
            failure_policy: StageFailurePolicy::default(),
            empty_input_policy: EmptyInputPolicy::default(),
            schema_validation: SchemaValidation::default(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            dpi: 150,
            max_rendered_pixels: 2000,
            page_concurrency: 4,
            parsing_instruction: None,
            extraction_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("input_dir", &self.input_dir)
            .field("parsed_md_dir", &self.parsed_md_dir)
            .field("output_json_dir", &self.output_json_dir)
            .field("merged_json_dir", &self.merged_json_dir)
            .field("merged_file_name", &self.merged_file_name)
            .field("sort_key", &self.sort_key)
            .field("failure_policy", &self.failure_policy)
            .field("empty_input_policy", &self.empty_input_policy)
            .field("schema_validation", &self.schema_validation)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("page_concurrency", &self.page_concurrency)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Full path of the merged dataset file.
    pub fn merged_file_path(&self) -> PathBuf {
        self.merged_json_dir.join(&self.merged_file_name)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn parsed_md_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.parsed_md_dir = dir.into();
        self
    }

    pub fn output_json_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_json_dir = dir.into();
        self
    }

    pub fn merged_json_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.merged_json_dir = dir.into();
        self
    }

    pub fn merged_file_name(mut self, name: impl Into<String>) -> Self {
        self.config.merged_file_name = name.into();
        self
    }

    pub fn sort_key(mut self, key: impl Into<String>) -> Self {
        self.config.sort_key = key.into();
        self
    }

    pub fn failure_policy(mut self, policy: StageFailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn empty_input_policy(mut self, policy: EmptyInputPolicy) -> Self {
        self.config.empty_input_policy = policy;
        self
    }

    pub fn schema_validation(mut self, mode: SchemaValidation) -> Self {
        self.config.schema_validation = mode;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn page_concurrency(mut self, n: usize) -> Self {
        self.config.page_concurrency = n.max(1);
        self
    }

    pub fn parsing_instruction(mut self, prompt: impl Into<String>) -> Self {
        self.config.parsing_instruction = Some(prompt.into());
        self
    }

    pub fn extraction_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.extraction_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.input_dir.as_os_str().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "input directory must not be empty".into(),
            ));
        }
        let roots: [(&str, &Path); 4] = [
            ("input", &c.input_dir),
            ("parsed-md", &c.parsed_md_dir),
            ("output-json", &c.output_json_dir),
            ("merged-json", &c.merged_json_dir),
        ];
        for (i, (name_a, a)) in roots.iter().enumerate() {
            for (name_b, b) in &roots[i + 1..] {
                if a == b {
                    return Err(PipelineError::InvalidConfig(format!(
                        "{name_a} and {name_b} directories must differ, both are {}",
                        a.display()
                    )));
                }
            }
        }
        if c.merged_file_name.is_empty()
            || c.merged_file_name.contains('/')
            || c.merged_file_name.contains('\\')
        {
            return Err(PipelineError::InvalidConfig(format!(
                "merged file name must be a plain file name, got '{}'",
                c.merged_file_name
            )));
        }
        if c.sort_key.is_empty() {
            return Err(PipelineError::InvalidConfig("sort key must not be empty".into()));
        }
        if c.page_concurrency == 0 {
            return Err(PipelineError::InvalidConfig(
                "Page concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Policies ─────────────────────────────────────────────────────────────

/// Whether individual file failures fail the stage that contains them.
///
/// | Policy | A stage fails when |
/// |--------|--------------------|
/// | `FailOpen` | it cannot start (default) |
/// | `FailOnAnyFile` | it cannot start, or any file failed |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StageFailurePolicy {
    #[default]
    FailOpen,
    FailOnAnyFile,
}

/// Outcome of a stage that discovered no matching input files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EmptyInputPolicy {
    /// Log a diagnostic and report success. (default)
    #[default]
    Succeed,
    /// Log a diagnostic and fail the stage.
    Fail,
}

/// How extracted records are checked against the deed field vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SchemaValidation {
    /// Any JSON object is accepted. (default)
    #[default]
    Off,
    /// Unknown keys are logged but kept.
    Warn,
    /// Unknown keys fail the file.
    Reject,
}
