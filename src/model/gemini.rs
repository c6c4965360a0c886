//! Native Gemini backend over the Generative Language REST API.
//!
//! One `POST models/{model}:generateContent` per page, carrying the
//! instruction as a text part and the page as an inline PNG part. The raw
//! JSON reply is handed back untouched so a blocked page can report its
//! `promptFeedback`, `finishReason` and `safetyRatings`.

use super::{ModelResponse, VisionModel};
use crate::error::ModelError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// Model used when the caller does not name one.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Public endpoint root.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini `generateContent` client.
#[derive(Clone)]
pub struct GeminiModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
    label: String,
    base_url: String,
    temperature: f32,
    max_output_tokens: usize,
}

impl fmt::Debug for GeminiModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiModel")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

impl GeminiModel {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ModelError::Transport(e.to_string()))?;
        let model = model.into();
        Ok(Self {
            client,
            api_key: api_key.into(),
            label: format!("gemini/{model}"),
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: 0.1,
            max_output_tokens: 4096,
        })
    }

    /// Point the client at a different endpoint root (proxies, emulators).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_generation(mut self, temperature: f32, max_output_tokens: usize) -> Self {
        self.temperature = temperature;
        self.max_output_tokens = max_output_tokens;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

// ── Request body ─────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: usize,
}

fn build_request<'a>(
    instruction: &'a str,
    png: &[u8],
    temperature: f32,
    max_output_tokens: usize,
) -> GenerateContentRequest<'a> {
    GenerateContentRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![
                Part::Text { text: instruction },
                Part::Inline {
                    inline_data: InlineData {
                        mime_type: "image/png",
                        data: STANDARD.encode(png),
                    },
                },
            ],
        }],
        generation_config: GenerationConfig {
            temperature,
            max_output_tokens,
        },
    }
}

#[async_trait]
impl VisionModel for GeminiModel {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate(&self, instruction: &str, png: &[u8]) -> Result<ModelResponse, ModelError> {
        let body = build_request(instruction, png, self.temperature, self.max_output_tokens);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| ModelError::MalformedResponse(e.to_string()))?;

        if let Some(usage) = raw.get("usageMetadata") {
            debug!(
                "{}: {} prompt tokens, {} candidate tokens",
                self.label,
                usage.get("promptTokenCount").and_then(serde_json::Value::as_u64).unwrap_or(0),
                usage.get("candidatesTokenCount").and_then(serde_json::Value::as_u64).unwrap_or(0),
            );
        }

        Ok(ModelResponse::from_envelope(raw))
    }
}
