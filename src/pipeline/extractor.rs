//! LLM-backed field extractor for stage 2.

use super::{llm, postprocess, TextExtractor};
use crate::config::PipelineConfig;
use crate::error::FileError;
use crate::merge::{ExtractedRecord, SOURCE_FILE_FIELD};
use crate::prompts::DEFAULT_EXTRACTION_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, LLMProvider};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// [`TextExtractor`] that asks a chat model for the deed fields as JSON.
pub struct LlmTextExtractor {
    provider: Arc<dyn LLMProvider>,
    prompt: String,
    settings: llm::CallSettings,
}

impl LlmTextExtractor {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self::from_config(provider, &PipelineConfig::default())
    }

    pub fn from_config(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            prompt: config
                .extraction_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_EXTRACTION_PROMPT.to_string()),
            settings: extraction_settings(config),
        }
    }
}

/// Call settings for extraction: the configured tuning plus JSON-object replies.
fn extraction_settings(config: &PipelineConfig) -> llm::CallSettings {
    llm::CallSettings::from(config).with_json_output()
}

#[async_trait]
impl TextExtractor for LlmTextExtractor {
    async fn extract(&self, markdown: &str) -> Result<ExtractedRecord, FileError> {
        let messages = vec![
            ChatMessage::system(self.prompt.as_str()),
            ChatMessage::user(markdown),
        ];
        let reply = llm::complete_with_retry(&self.provider, "extract", &messages, &self.settings).await?;
        parse_record(&reply)
    }
}

/// Turn a model reply into a flat record of string fields.
///
/// Code fences are stripped and the reply must hold a JSON object. Numbers
/// and booleans become their text form, nested values their compact JSON
/// text. Nulls, blank strings and the reserved `source_file` key are dropped.
pub fn parse_record(reply: &str) -> Result<ExtractedRecord, FileError> {
    let json = postprocess::strip_json_fences(reply);
    let value: Value = serde_json::from_str(&json).map_err(|e| FileError::InvalidJson {
        detail: e.to_string(),
    })?;

    let Value::Object(fields) = value else {
        return Err(FileError::InvalidJson {
            detail: "reply is not a JSON object".to_string(),
        });
    };

    let mut record = ExtractedRecord::new();
    for (key, value) in fields {
        if key == SOURCE_FILE_FIELD {
            debug!("Dropping reserved field '{}' from model reply", key);
            continue;
        }
        let text = match value {
            Value::Null => continue,
            Value::String(s) => s.trim().to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            nested @ (Value::Array(_) | Value::Object(_)) => nested.to_string(),
        };
        if text.is_empty() {
            continue;
        }
        record.insert(key, Value::String(text));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_requests_json_object_replies() {
        let config = PipelineConfig::builder().temperature(0.3).build().unwrap();
        let opts = extraction_settings(&config).options();
        assert_eq!(opts.response_format.as_deref(), Some("json_object"));
        assert_eq!(opts.temperature, Some(0.3));
    }

    #[test]
    fn fenced_reply_is_parsed_in_order() {
        let reply = "```json\n{\"เลขโฉนดที่ดิน\": \"1234\", \"ตำบล\": \"บางรัก\"}\n```";
        let record = parse_record(reply).unwrap();
        let keys: Vec<_> = record.keys().cloned().collect();
        assert_eq!(keys, vec!["เลขโฉนดที่ดิน", "ตำบล"]);
    }

    #[test]
    fn values_are_normalised_to_strings() {
        let reply = r#"{"เลขที่ดิน": 42, "ระวาง": null, "ตำบล": "  ", "flag": true, "ค่าพิกัดแปลง": [13.7, 100.5], "source_file": "x"}"#;
        let record = parse_record(reply).unwrap();
        assert_eq!(record["เลขที่ดิน"], "42");
        assert_eq!(record["flag"], "true");
        assert_eq!(record["ค่าพิกัดแปลง"], "[13.7,100.5]");
        assert!(!record.contains_key("ระวาง"));
        assert!(!record.contains_key("ตำบล"));
        assert!(!record.contains_key(SOURCE_FILE_FIELD));
    }

    #[test]
    fn non_object_reply_is_rejected() {
        assert!(matches!(parse_record("[1, 2]"), Err(FileError::InvalidJson { .. })));
        assert!(matches!(
            parse_record("Sorry, I cannot read this deed."),
            Err(FileError::InvalidJson { .. })
        ));
    }
}
