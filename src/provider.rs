//! Model provider selection for both stages.
//!
//! Deeds are scanned documents, so whichever provider is picked must serve a
//! vision-capable model: stage 1 sends page images to it.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::info;

/// Model used when none is configured (`--model` / `OPENAI_MODEL`).
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// A provider named explicitly, by config or environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProviderChoice {
    pub provider: String,
    pub model: String,
}

/// Pick a provider by name, without building it.
///
/// `config.provider_name` wins, then the `EDGEQUAKE_LLM_PROVIDER` +
/// `EDGEQUAKE_MODEL` pair (both must be set), then OpenAI when
/// `OPENAI_API_KEY` is present. `None` leaves the choice to auto-detection.
pub(crate) fn choose_provider(
    config: &PipelineConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Option<ProviderChoice> {
    let env = |key: &str| env(key).filter(|v| !v.is_empty());
    let model = config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());

    if let Some(ref name) = config.provider_name {
        return Some(ProviderChoice {
            provider: name.clone(),
            model,
        });
    }
    if let (Some(provider), Some(model)) = (env("EDGEQUAKE_LLM_PROVIDER"), env("EDGEQUAKE_MODEL")) {
        return Some(ProviderChoice { provider, model });
    }
    env("OPENAI_API_KEY").map(|_| ProviderChoice {
        provider: "openai".to_string(),
        model,
    })
}

/// Build the provider both stages share.
///
/// An injected `config.provider` is used as-is. Otherwise the provider named
/// by [`choose_provider`] is built through [`ProviderFactory`], falling back
/// to [`ProviderFactory::from_env`] auto-detection.
///
/// # Errors
/// [`PipelineError::ProviderNotConfigured`] when nothing usable is found.
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(choice) = choose_provider(config, |key| std::env::var(key).ok()) {
        info!("Using provider '{}' with model '{}'", choice.provider, choice.model);
        return ProviderFactory::create_llm_provider(&choice.provider, &choice.model).map_err(|e| {
            PipelineError::ProviderNotConfigured {
                provider: choice.provider.clone(),
                hint: format!(
                    "Could not start model '{}': {}\nCheck the provider's API key and that the \
                     model accepts images.",
                    choice.model, e
                ),
            }
        });
    }

    let (llm, _embedding) =
        ProviderFactory::from_env().map_err(|e| PipelineError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "Deed parsing needs a vision model. Set OPENAI_API_KEY (model via OPENAI_MODEL), \
                 or pass --provider and --model.\nDetails: {e}"
            ),
        })?;
    info!("Provider auto-detected from environment");
    Ok(llm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    fn choice(provider: &str, model: &str) -> Option<ProviderChoice> {
        Some(ProviderChoice {
            provider: provider.to_string(),
            model: model.to_string(),
        })
    }

    #[test]
    fn named_provider_wins_over_environment() {
        let config = PipelineConfig::builder()
            .provider_name("anthropic")
            .model("claude-sonnet")
            .build()
            .unwrap();
        let env = env_of(&[("OPENAI_API_KEY", "sk-x"), ("EDGEQUAKE_LLM_PROVIDER", "gemini")]);
        assert_eq!(choose_provider(&config, env), choice("anthropic", "claude-sonnet"));
    }

    #[test]
    fn environment_pair_needs_both_values() {
        let config = PipelineConfig::default();
        let pair = env_of(&[("EDGEQUAKE_LLM_PROVIDER", "ollama"), ("EDGEQUAKE_MODEL", "llava")]);
        assert_eq!(choose_provider(&config, pair), choice("ollama", "llava"));

        let half = env_of(&[("EDGEQUAKE_LLM_PROVIDER", "ollama"), ("EDGEQUAKE_MODEL", "")]);
        assert_eq!(choose_provider(&config, half), None);
    }

    #[test]
    fn openai_key_selects_default_vision_model() {
        let config = PipelineConfig::default();
        let env = env_of(&[("OPENAI_API_KEY", "sk-x")]);
        assert_eq!(choose_provider(&config, env), choice("openai", DEFAULT_MODEL));
    }

    #[test]
    fn nothing_configured_defers_to_auto_detection() {
        assert_eq!(choose_provider(&PipelineConfig::default(), env_of(&[])), None);
    }
}
