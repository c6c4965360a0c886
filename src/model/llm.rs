//! edgequake-llm adapter: any vision-capable `LLMProvider` as a [`VisionModel`].
//!
//! The instruction and the page travel in one user message, mirroring the
//! single combined request the Gemini backend sends. Provider replies are
//! wrapped in a one-candidate `generateContent` envelope so the extractor
//! treats both backends the same way.

use super::{ModelResponse, VisionModel};
use crate::error::ModelError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Model used with a named provider when the caller does not name one.
pub const DEFAULT_LLM_MODEL: &str = "gpt-4.1-nano";

pub struct LlmProviderModel {
    provider: Arc<dyn LLMProvider>,
    label: String,
    temperature: f32,
    max_tokens: usize,
}

impl LlmProviderModel {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        label: impl Into<String>,
        temperature: f32,
        max_tokens: usize,
    ) -> Self {
        Self {
            provider,
            label: label.into(),
            temperature,
            max_tokens,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

/// Wrap a PNG for the multimodal request body.
///
/// `detail: "high"` keeps small box values legible on OpenAI-class models.
fn image_data(png: &[u8]) -> ImageData {
    ImageData::new(STANDARD.encode(png), "image/png").with_detail("high")
}

#[async_trait]
impl VisionModel for LlmProviderModel {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate(&self, instruction: &str, png: &[u8]) -> Result<ModelResponse, ModelError> {
        let messages = vec![ChatMessage::user_with_images(
            instruction,
            vec![image_data(png)],
        )];

        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| ModelError::Provider(e.to_string()))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, response.prompt_tokens, response.completion_tokens
        );

        Ok(ModelResponse::from_envelope(json!({
            "candidates": [{
                "content": { "parts": [{ "text": response.content }] }
            }],
            "usageMetadata": {
                "promptTokenCount": response.prompt_tokens,
                "candidatesTokenCount": response.completion_tokens
            }
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_data_is_png_base64() {
        let data = image_data(&[0x89, b'P', b'N', b'G']);
        assert_eq!(data.mime_type, "image/png");
        assert_eq!(STANDARD.decode(&data.data).unwrap(), vec![0x89, b'P', b'N', b'G']);
    }
}
