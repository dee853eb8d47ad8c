//! Model calls with timeout, retry and backoff.
//!
//! Both collaborators (the vision parser and the text extractor) funnel their
//! requests through [`complete_with_retry`], so retry and error mapping live
//! in one place and prompt wording stays in [`crate::prompts`].
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! concurrent load. Exponential backoff (`retry_backoff_ms * 2^attempt`)
//! avoids thundering-herd: with 500 ms base and 3 retries the wait sequence
//! is 500 ms → 1 s → 2 s. Each attempt is bounded by `api_timeout_secs`.

use crate::config::PipelineConfig;
use crate::error::FileError;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// The subset of [`PipelineConfig`] a single model call needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallSettings {
    pub temperature: f32,
    pub max_tokens: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub api_timeout_secs: u64,
    /// Ask the provider for a bare JSON object (`response_format = json_object`).
    pub json_output: bool,
}

impl From<&PipelineConfig> for CallSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout_secs: config.api_timeout_secs,
            json_output: false,
        }
    }
}

impl Default for CallSettings {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl CallSettings {
    /// Same settings, with JSON-object replies requested.
    pub fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }

    pub(crate) fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            response_format: self.json_output.then(|| "json_object".to_string()),
            ..Default::default()
        }
    }
}

/// Send `messages` and return the reply text.
///
/// `label` identifies the request in log lines (`"page 3"`, `"extract"`).
///
/// # Errors
/// [`FileError::Timeout`] when every attempt timed out, otherwise
/// [`FileError::LlmFailed`] carrying the last provider error.
pub async fn complete_with_retry(
    provider: &Arc<dyn LLMProvider>,
    label: &str,
    messages: &[ChatMessage],
    settings: &CallSettings,
) -> Result<String, FileError> {
    let start = Instant::now();
    let options = settings.options();
    let call_timeout = Duration::from_secs(settings.api_timeout_secs);

    let mut last_err: Option<String> = None;
    let mut all_timed_out = true;

    for attempt in 0..=settings.max_retries {
        if attempt > 0 {
            let backoff = settings.backoff(attempt);
            warn!(
                "{}: retry {}/{} after {}ms",
                label,
                attempt,
                settings.max_retries,
                backoff.as_millis()
            );
            sleep(backoff).await;
        }

        match timeout(call_timeout, provider.chat(messages, Some(&options))).await {
            Ok(Ok(response)) => {
                debug!(
                    "{}: {} input tokens, {} output tokens, {:?}",
                    label,
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                return Ok(response.content);
            }
            Ok(Err(e)) => {
                all_timed_out = false;
                let err_msg = e.to_string();
                warn!("{}: attempt {} failed: {}", label, attempt + 1, err_msg);
                last_err = Some(err_msg);
            }
            Err(_) => {
                warn!(
                    "{}: attempt {} timed out after {}s",
                    label,
                    attempt + 1,
                    settings.api_timeout_secs
                );
                last_err = Some(format!("timed out after {}s", settings.api_timeout_secs));
            }
        }
    }

    if all_timed_out {
        return Err(FileError::Timeout {
            secs: settings.api_timeout_secs,
        });
    }

    Err(FileError::LlmFailed {
        retries: settings.max_retries,
        detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
    })
}
