//! Page extraction: one PNG page in, one [`ExtractionRecord`] out.
//!
//! [`extract_page`] never fails. Every failure mode (service error, timeout,
//! blocked or empty reply, unrecoverable text, bad JSON) comes back as an
//! [`ExtractionRecord::Failed`] so the aggregator can keep going.
//!
//! ## Retry Strategy
//!
//! Only transient [`ModelError`]s are retried (see
//! [`ModelError::is_transient`]). The wait doubles per attempt:
//! `retry_backoff_ms * 2^(attempt-1)`. A reply that arrives but is blocked
//! or unparseable is final; asking again rarely changes a safety verdict.

use crate::config::ExtractionConfig;
use crate::error::{ModelError, PageError};
use crate::model::{ModelResponse, VisionModel};
use crate::output::{ExtractionFailure, ExtractionRecord, ResponseFeedback};
use crate::pipeline::recover::{normalize_reply, parse_fields};
use crate::templates::template_for;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Per-call knobs for [`extract_page`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageOptions {
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub api_timeout: Duration,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self::from_config(&ExtractionConfig::default())
    }
}

impl PageOptions {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }
}

/// Extract the fields of one page of a `doc_type` document.
pub async fn extract_page(
    model: &dyn VisionModel,
    png: &[u8],
    doc_type: &str,
    options: &PageOptions,
) -> ExtractionRecord {
    let template = template_for(doc_type);
    let start = Instant::now();

    let response = match generate_with_retry(model, template.as_str(), png, options).await {
        Ok(response) => response,
        Err(e) => {
            return ExtractionFailure::new(PageError::ModelService {
                detail: e.to_string(),
            })
            .into();
        }
    };
    debug!("{} answered in {:?}", model.name(), start.elapsed());

    let Some(text) = response.text.as_deref() else {
        let feedback = ResponseFeedback::probe(&response.raw);
        let detail = match feedback.finish_reason.as_deref() {
            Some(reason) => format!("response contained no text (finish reason: {reason})"),
            None => "response contained no text".to_string(),
        };
        warn!("{} for '{}' page", detail, doc_type);
        return ExtractionFailure::new(PageError::ModelService { detail })
            .with_feedback(feedback)
            .into();
    };

    match parse_fields(text, doc_type) {
        Ok(fields) => ExtractionRecord::Fields(fields),
        Err(e) => {
            warn!("Unusable reply for '{}' page: {}", doc_type, e);
            ExtractionFailure::new(e)
                .with_raw_response(normalize_reply(text))
                .into()
        }
    }
}

async fn generate_with_retry(
    model: &dyn VisionModel,
    instruction: &str,
    png: &[u8],
    options: &PageOptions,
) -> Result<ModelResponse, ModelError> {
    let mut attempt = 0u32;
    loop {
        if attempt > 0 {
            let backoff = backoff_ms(options.retry_backoff_ms, attempt);
            warn!(
                "{}: retry {}/{} after {}ms",
                model.name(),
                attempt,
                options.max_retries,
                backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        let result = match timeout(options.api_timeout, model.generate(instruction, png)).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout {
                secs: options.api_timeout.as_secs(),
            }),
        };

        match result {
            Ok(response) => return Ok(response),
            Err(e) if e.is_transient() && attempt < options.max_retries => {
                warn!("{}: attempt {} failed: {}", model.name(), attempt + 1, e);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
/// saturating at `u64::MAX`.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Plays back a queue of outcomes, one per call.
    struct Scripted {
        outcomes: Mutex<Vec<Result<ModelResponse, ModelError>>>,
        calls: AtomicU32,
        seen_instruction: Mutex<Option<String>>,
    }

    impl Scripted {
        fn new(mut outcomes: Vec<Result<ModelResponse, ModelError>>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                calls: AtomicU32::new(0),
                seen_instruction: Mutex::new(None),
            }
        }

        fn reply(text: &str) -> Self {
            Self::new(vec![Ok(ModelResponse::from_text(text))])
        }
    }

    #[async_trait]
    impl VisionModel for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, instruction: &str, _png: &[u8]) -> Result<ModelResponse, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_instruction.lock().unwrap() = Some(instruction.to_string());
            self.outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(ModelError::Provider("script exhausted".into())))
        }
    }

    fn fast() -> PageOptions {
        PageOptions {
            max_retries: 2,
            retry_backoff_ms: 0,
            api_timeout: Duration::from_secs(5),
        }
    }

    fn fields_of(record: ExtractionRecord) -> Value {
        Value::Object(record.fields().cloned().expect("success record"))
    }

    #[tokio::test]
    async fn fenced_w2_reply() {
        let model = Scripted::reply("```json\n{\"WagesTipsOtherComp\": \"50000.00\"}\n```");
        let record = extract_page(&model, b"png", "W-2", &fast()).await;
        assert_eq!(
            fields_of(record),
            json!({"WagesTipsOtherComp": "50000.00", "DocumentType": "W-2"})
        );
        let instruction = model.seen_instruction.lock().unwrap().clone().unwrap();
        assert!(instruction.contains("W-2"));
    }

    #[tokio::test]
    async fn chatty_invoice_reply() {
        let model = Scripted::reply("Here is the data: {\"TotalAmount\": \"120.00\"} Thanks!");
        let record = extract_page(&model, b"png", "Invoice", &fast()).await;
        assert_eq!(
            fields_of(record),
            json!({"TotalAmount": "120.00", "DocumentType": "Invoice"})
        );
    }

    #[tokio::test]
    async fn refusal_keeps_raw_response() {
        let model = Scripted::reply("I cannot process this image.");
        let record = extract_page(&model, b"png", "W-2", &fast()).await;
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "error": "Failed to find valid JSON in Gemini response.",
                "raw_response": "I cannot process this image."
            })
        );
    }

    #[tokio::test]
    async fn bad_json_is_decode_error() {
        let model = Scripted::reply("{\"Box1\": \"10.00\",}");
        let record = extract_page(&model, b"png", "1099-INT", &fast()).await;
        let err = record.error().unwrap();
        assert!(err.starts_with("JSONDecodeError: "), "{err}");
    }

    #[tokio::test]
    async fn blocked_reply_reports_feedback() {
        let model = Scripted::new(vec![Ok(ModelResponse::from_envelope(json!({
            "candidates": [{
                "finishReason": "SAFETY",
                "safetyRatings": [{"category": "HARM_CATEGORY_DANGEROUS_CONTENT", "probability": "HIGH"}]
            }],
            "promptFeedback": {"blockReason": "SAFETY"}
        })))]);
        let record = extract_page(&model, b"png", "W-2", &fast()).await;
        let ExtractionRecord::Failed(failure) = record else {
            panic!("expected failure");
        };
        assert_eq!(
            failure.error,
            "Gemini API call failed: response contained no text (finish reason: SAFETY)"
        );
        let feedback = failure.feedback.unwrap();
        assert_eq!(feedback.finish_reason.as_deref(), Some("SAFETY"));
        assert!(feedback.safety_ratings.is_some());
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let model = Scripted::new(vec![
            Err(ModelError::Status { status: 503, body: "overloaded".into() }),
            Err(ModelError::Transport("connection reset".into())),
            Ok(ModelResponse::from_text("{\"NetIncome\": \"9.00\"}")),
        ]);
        let record = extract_page(&model, b"png", "Profit and Loss Statement", &fast()).await;
        assert!(!record.is_error());
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_run_out() {
        let model = Scripted::new(vec![
            Err(ModelError::Status { status: 429, body: "slow down".into() }),
            Err(ModelError::Status { status: 429, body: "slow down".into() }),
            Err(ModelError::Status { status: 429, body: "slow down".into() }),
        ]);
        let record = extract_page(&model, b"png", "W-2", &fast()).await;
        assert_eq!(record.error(), Some("Gemini API call failed: HTTP 429: slow down"));
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let model = Scripted::new(vec![Err(ModelError::Status {
            status: 400,
            body: "API key not valid".into(),
        })]);
        let record = extract_page(&model, b"png", "W-2", &fast()).await;
        assert!(record.error().unwrap().contains("API key not valid"));
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        struct Slow;

        #[async_trait]
        impl VisionModel for Slow {
            fn name(&self) -> &str {
                "slow"
            }
            async fn generate(&self, _: &str, _: &[u8]) -> Result<ModelResponse, ModelError> {
                sleep(Duration::from_secs(30)).await;
                Ok(ModelResponse::from_text("{}"))
            }
        }

        let options = PageOptions {
            max_retries: 0,
            retry_backoff_ms: 0,
            api_timeout: Duration::from_millis(20),
        };
        let record = extract_page(&Slow, b"png", "W-2", &options).await;
        assert_eq!(record.error(), Some("Gemini API call failed: call timed out after 0s"));
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 2), 1000);
        assert_eq!(backoff_ms(500, 4), 4000);
        assert_eq!(backoff_ms(500, 60), u64::MAX);
        assert_eq!(backoff_ms(1, 65), u64::MAX);
        assert_eq!(backoff_ms(0, 200), 0);
    }

    #[test]
    fn long_retry_runs_do_not_overflow() {
        let mut outcomes: Vec<Result<ModelResponse, ModelError>> = (0..70)
            .map(|_| Err(ModelError::Status { status: 503, body: "overloaded".into() }))
            .collect();
        outcomes.push(Ok(ModelResponse::from_text("{\"Box1\": \"1.00\"}")));
        let model = Scripted::new(outcomes);
        let options = PageOptions {
            max_retries: 70,
            retry_backoff_ms: 0,
            api_timeout: Duration::from_secs(5),
        };
        let record = tokio_test::block_on(extract_page(&model, b"png", "1099-INT", &options));
        assert!(!record.is_error(), "{:?}", record.error());
        assert_eq!(model.calls.load(Ordering::SeqCst), 71);
    }
}
