//! # taxdoc-extract
//!
//! Extract structured key-value fields from scanned tax and financial
//! documents (W-2, 1099s, P&L and cash-flow statements, invoices) using
//! Vision Language Models.
//!
//! Each page is rasterised to a PNG and sent to a vision model together
//! with a type-specific instruction listing the fields to capture. The
//! model answers with a JSON object; the crate recovers it from fenced or
//! chatty replies and collects one record per page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Render   rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 2. Encode   DynamicImage → PNG bytes
//!  ├─ 3. Model    template instruction + page image → reply
//!  ├─ 4. Recover  strip fences, slice { … }, parse, tag DocumentType
//!  └─ 5. Output   ordered { "page_1": {...}, "page_2": {...} } map
//! ```
//!
//! A failed page never aborts the document: it gets an `error` record and
//! the next page runs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use taxdoc_extract::{extract_document, DocumentExtraction, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Backend auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / ANTHROPIC_API_KEY
//!     let config = ExtractionConfig::default();
//!     let result = extract_document("w2_2024.pdf", "W-2", &config).await;
//!     println!("{}", DocumentExtraction::from(result).to_json_pretty()?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `taxdoc` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! ```toml
//! taxdoc-extract = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod templates;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{ExtractError, ModelError, PageError, RasterError};
pub use extract::{extract_document, extract_from_bytes, extract_sync, extract_to_file};
pub use model::{resolve_model, GeminiModel, LlmProviderModel, ModelResponse, VisionModel};
pub use output::{
    DocumentExtraction, ExtractionFailure, ExtractionRecord, ExtractionSummary, PageResultMap,
    ResponseFeedback,
};
pub use pipeline::page::{extract_page, PageOptions};
pub use pipeline::render::{PdfiumRasterizer, Rasterizer};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use templates::{template_for, Template, OTHER_DOCUMENT_TYPE, SPECIALIZED_TYPES};
