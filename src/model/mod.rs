//! Vision model backends.
//!
//! The page extractor only sees [`VisionModel`]: one instruction string plus
//! one PNG in, one [`ModelResponse`] (or [`ModelError`]) out. Two backends
//! ship with the crate:
//!
//! * [`gemini::GeminiModel`]: native `generateContent` REST calls. Only this
//!   backend exposes prompt feedback and safety ratings for blocked replies.
//! * [`llm::LlmProviderModel`]: any `edgequake_llm` provider (OpenAI,
//!   Anthropic, Ollama, Azure).
//!
//! Tests and embedders can inject their own implementation through
//! [`crate::config::ExtractionConfig::model_service`].

pub mod gemini;
pub mod llm;

use crate::config::ExtractionConfig;
use crate::error::{ExtractError, ModelError};
use async_trait::async_trait;
use edgequake_llm::{LLMProvider, ProviderFactory};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

pub use gemini::GeminiModel;
pub use llm::LlmProviderModel;

/// Provider name that selects the native Gemini backend.
pub const GEMINI_PROVIDER: &str = "gemini";

/// A vision-capable model that answers one instruction about one page image.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Short label used in logs, e.g. `"gemini/gemini-2.5-flash"`.
    fn name(&self) -> &str;

    /// Send `instruction` and the PNG-encoded page as a single request.
    async fn generate(&self, instruction: &str, png: &[u8]) -> Result<ModelResponse, ModelError>;
}

/// A model reply in `generateContent` envelope form.
///
/// `raw` is kept so diagnostics can be probed from it when `text` is absent.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    /// Concatenated text of the first candidate, `None` when blank.
    pub text: Option<String>,
    pub raw: Value,
}

impl ModelResponse {
    /// Build a response from a `generateContent` JSON envelope.
    pub fn from_envelope(raw: Value) -> Self {
        let text = first_candidate_text(&raw);
        Self { text, raw }
    }

    /// Wrap plain reply text in a single-candidate envelope.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::from_envelope(json!({
            "candidates": [{
                "content": { "parts": [{ "text": text.into() }] },
                "finishReason": "STOP"
            }]
        }))
    }
}

fn first_candidate_text(raw: &Value) -> Option<String> {
    let parts = raw
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Resolve the vision backend, from most-specific to least-specific.
///
/// 1. **Pre-built model** (`config.model_service`), used as-is.
/// 2. **Named provider** (`config.provider_name`): `"gemini"` selects the
///    native backend, any other name goes through the edgequake-llm factory.
/// 3. **Gemini key** (`config.api_key` or `GEMINI_API_KEY`).
/// 4. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 5. **Full auto-detection** via `ProviderFactory::from_env`.
pub fn resolve_model(config: &ExtractionConfig) -> Result<Arc<dyn VisionModel>, ExtractError> {
    if let Some(ref model) = config.model_service {
        return Ok(Arc::clone(model));
    }

    if let Some(ref name) = config.provider_name {
        if name.eq_ignore_ascii_case(GEMINI_PROVIDER) {
            return gemini_from_config(config);
        }
        let model = config.model.as_deref().unwrap_or(llm::DEFAULT_LLM_MODEL);
        return create_llm_model(name, model, config);
    }

    if gemini_api_key(config).is_some() {
        return gemini_from_config(config);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_llm_model(&prov, &model, config);
        }
    }

    let (provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractError::ModelNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision model could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY or ANTHROPIC_API_KEY, or pass a provider.\n\
                Error: {e}"
            ),
        })?;
    debug!("Auto-detected edgequake-llm provider");
    Ok(Arc::new(LlmProviderModel::new(
        provider,
        "auto",
        config.temperature,
        config.max_tokens,
    )))
}

fn gemini_api_key(config: &ExtractionConfig) -> Option<String> {
    config
        .api_key
        .clone()
        .or_else(|| std::env::var("GEMINI_API_KEY").ok())
        .filter(|k| !k.trim().is_empty())
}

fn gemini_from_config(config: &ExtractionConfig) -> Result<Arc<dyn VisionModel>, ExtractError> {
    let key = gemini_api_key(config).ok_or_else(|| ExtractError::ModelNotConfigured {
        provider: GEMINI_PROVIDER.to_string(),
        hint: "GEMINI_API_KEY not found. Export it or pass --api-key.".to_string(),
    })?;
    let model = config
        .model
        .as_deref()
        .unwrap_or(gemini::DEFAULT_GEMINI_MODEL);
    let gemini = GeminiModel::new(key, model)
        .map_err(|e| ExtractError::ModelNotConfigured {
            provider: GEMINI_PROVIDER.to_string(),
            hint: e.to_string(),
        })?
        .with_generation(config.temperature, config.max_tokens);
    Ok(Arc::new(gemini))
}

fn create_llm_model(
    provider_name: &str,
    model: &str,
    config: &ExtractionConfig,
) -> Result<Arc<dyn VisionModel>, ExtractError> {
    let provider: Arc<dyn LLMProvider> = ProviderFactory::create_llm_provider(provider_name, model)
        .map_err(|e| ExtractError::ModelNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        })?;
    Ok(Arc::new(LlmProviderModel::new(
        provider,
        format!("{provider_name}/{model}"),
        config.temperature,
        config.max_tokens,
    )))
}
