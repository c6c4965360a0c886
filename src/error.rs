//! Error types for the taxdoc-extract library.
//!
//! Four error types map onto four layers of the pipeline:
//!
//! * [`ExtractError`] is **fatal**: the document cannot be processed at all
//!   (source missing, rasterisation failed, no model backend configured).
//!   Returned as `Err(ExtractError)` from the `extract*` entry points.
//!
//! * [`PageError`] is **non-fatal**: one page failed (model outage, blocked
//!   reply, unparseable JSON). It is folded into an
//!   [`crate::output::ExtractionRecord::Failed`] for that page and the
//!   remaining pages carry on.
//!
//! * [`ModelError`]: a single call to a [`crate::model::VisionModel`] failed.
//!   The page extractor decides whether to retry it.
//!
//! * [`RasterError`]: the [`crate::pipeline::render::Rasterizer`] could not
//!   produce page images. Always surfaces as [`ExtractError::Rasterization`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the taxdoc-extract library.
///
/// Page-level failures use [`PageError`] and are stored in the
/// [`crate::output::PageResultMap`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The source document does not exist.
    #[error("Source PDF file not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    // ── Rasterisation errors ──────────────────────────────────────────────
    /// The rasterizer could not turn the source into page images.
    #[error("Failed PDF-to-image conversion: {reason}")]
    Rasterization { path: PathBuf, reason: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// No vision model backend could be resolved from config or environment.
    #[error("Vision model backend '{provider}' is not configured.\n{hint}")]
    ModelNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{}': {source}", path.display())]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// The display strings are the `error` values callers see in the JSON blob,
/// so they are kept stable.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The model call failed, timed out, or returned no usable text.
    #[error("Gemini API call failed: {detail}")]
    ModelService { detail: String },

    /// The reply contained no `{ … }` object to recover.
    #[error("Failed to find valid JSON in Gemini response.")]
    NoJsonFound,

    /// A candidate object was found but did not parse as JSON.
    #[error("JSONDecodeError: {detail}")]
    JsonDecode { detail: String },

    /// Anything else that broke the page: an encoding failure or a panic
    /// caught at the aggregator boundary.
    #[error("Failed to process page: {detail}")]
    Unexpected { detail: String },
}

/// Failure of one call to a vision model backend.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// The request never produced an HTTP response (DNS, TLS, reset, …).
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The call exceeded the configured per-call timeout.
    #[error("call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// A provider-level error reported by the edgequake-llm backend.
    #[error("{0}")]
    Provider(String),

    /// The response body could not be decoded.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ModelError {
    /// Whether retrying the same request may succeed.
    ///
    /// Rate limits (429) and server-side errors (5xx) are transient;
    /// any other 4xx means the request itself is wrong.
    pub fn is_transient(&self) -> bool {
        match self {
            ModelError::Transport(_) | ModelError::Timeout { .. } => true,
            ModelError::Status { status, .. } => *status == 429 || *status >= 500,
            ModelError::Provider(msg) => {
                let msg = msg.to_ascii_lowercase();
                msg.contains("rate limit") || msg.contains("timeout") || msg.contains("503")
            }
            ModelError::MalformedResponse(_) => false,
        }
    }
}

/// Failure of a [`crate::pipeline::render::Rasterizer`].
#[derive(Debug, Error)]
pub enum RasterError {
    /// Could not bind to a pdfium library.
    #[error(
        "failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    Binding(String),

    /// PDF requires a password but none was provided.
    #[error("PDF '{}' is encrypted and requires a password", path.display())]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("wrong password for PDF '{}'", path.display())]
    WrongPassword { path: PathBuf },

    /// The document could not be parsed.
    #[error("PDF '{}' is corrupt: {detail}", path.display())]
    Corrupt { path: PathBuf, detail: String },

    /// pdfium failed on a specific page.
    #[error("rendering failed for page {page}: {detail}")]
    PageRender { page: usize, detail: String },

    /// The rasterizer task itself died.
    #[error("render task failed: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_not_found_display() {
        let e = ExtractError::SourceNotFound {
            path: PathBuf::from("/no/such/w2.pdf"),
        };
        assert_eq!(e.to_string(), "Source PDF file not found: /no/such/w2.pdf");
    }

    #[test]
    fn rasterization_display_keeps_reason() {
        let e = ExtractError::Rasterization {
            path: PathBuf::from("w2.pdf"),
            reason: "pdfium missing".into(),
        };
        assert_eq!(e.to_string(), "Failed PDF-to-image conversion: pdfium missing");
    }

    #[test]
    fn no_json_found_message_is_stable() {
        assert_eq!(
            PageError::NoJsonFound.to_string(),
            "Failed to find valid JSON in Gemini response."
        );
    }

    #[test]
    fn model_service_display() {
        let e = PageError::ModelService {
            detail: "HTTP 500: boom".into(),
        };
        assert_eq!(e.to_string(), "Gemini API call failed: HTTP 500: boom");
    }

    #[test]
    fn transient_classification() {
        assert!(ModelError::Transport("reset".into()).is_transient());
        assert!(ModelError::Timeout { secs: 5 }.is_transient());
        assert!(ModelError::Status { status: 429, body: String::new() }.is_transient());
        assert!(ModelError::Status { status: 503, body: String::new() }.is_transient());
        assert!(!ModelError::Status { status: 400, body: String::new() }.is_transient());
        assert!(!ModelError::Status { status: 401, body: String::new() }.is_transient());
        assert!(!ModelError::MalformedResponse("eof".into()).is_transient());
    }
}
