//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to follow a
//! run page by page. The CLI drives its progress bar this way.
//!
//! # Example
//!
//! ```rust
//! use taxdoc_extract::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct FieldCounter {
//!     fields: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for FieldCounter {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, field_count: usize) {
//!         self.fields.fetch_add(field_count, Ordering::SeqCst);
//!         eprintln!("page {}/{}: {} fields", page_num, total_pages, field_count);
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(FieldCounter { fields: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the aggregator as it works through a document.
///
/// All methods default to no-ops. With `concurrency > 1` the page-level
/// methods may be called from several tasks at once, so implementations
/// guard shared state with atomics or a `Mutex`.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once, after rasterization, with the page count.
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called before the model request for a page (1-indexed).
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page produced a field map.
    ///
    /// `field_count` includes the injected `DocumentType` key.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, field_count: usize) {
        let _ = (page_num, total_pages, field_count);
    }

    /// Called when a page ended in an error record.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after every page has a record.
    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// Default when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
