//! Document-level extraction entry points.
//!
//! [`extract_document`] is the core: verify the source, rasterize it, run
//! every page through [`crate::pipeline::page::extract_page`] and collect
//! the records in page order. The other entry points wrap it for in-memory
//! input, file output and blocking callers.

use crate::config::ExtractionConfig;
use crate::error::{ExtractError, PageError, RasterError};
use crate::model::{resolve_model, VisionModel};
use crate::output::{DocumentExtraction, ExtractionRecord, PageResultMap};
use crate::pipeline::encode::encode_png;
use crate::pipeline::page::{extract_page, PageOptions};
use crate::pipeline::render::{PdfiumRasterizer, Rasterizer};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use image::DynamicImage;
use std::any::Any;
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Extract every page of `source` as a `doc_type` document.
///
/// # Returns
/// `Ok(PageResultMap)` whenever the document could be rasterized, even if
/// some or all pages failed; failed pages carry an error record.
///
/// # Errors
/// Only whole-document failures:
/// - the source does not exist
/// - no model backend could be resolved
/// - rasterization failed
pub async fn extract_document(
    source: impl AsRef<Path>,
    doc_type: &str,
    config: &ExtractionConfig,
) -> Result<PageResultMap, ExtractError> {
    let total_start = Instant::now();
    let source = source.as_ref();
    info!("Starting extraction: {} as '{}'", source.display(), doc_type);

    // ── Step 1: Source must exist ────────────────────────────────────────
    if !source.exists() {
        error!("Source PDF file not found: {}", source.display());
        return Err(ExtractError::SourceNotFound {
            path: source.to_path_buf(),
        });
    }

    // ── Step 2: Resolve the model backend ────────────────────────────────
    let model = resolve_model(config)?;
    debug!("Using vision model {}", model.name());

    // ── Step 3: Rasterize ────────────────────────────────────────────────
    let render_start = Instant::now();
    let images = rasterize(source, config).await?;
    let total_pages = images.len();
    info!(
        "Rasterized {} pages in {}ms",
        total_pages,
        render_start.elapsed().as_millis()
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_start(total_pages);
    }

    // ── Step 4: Extract page by page ─────────────────────────────────────
    let options = PageOptions::from_config(config);
    let model: &dyn VisionModel = model.as_ref();
    let callback = config.progress_callback.as_ref();

    let records: Vec<(usize, ExtractionRecord)> =
        stream::iter(images.into_iter().enumerate().map(|(idx, image)| {
            let page_num = idx + 1;
            let options = &options;
            async move {
                if let Some(cb) = callback {
                    cb.on_page_start(page_num, total_pages);
                }

                let record = AssertUnwindSafe(process_page(model, image, doc_type, options))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        let detail = panic_message(panic.as_ref());
                        error!("Page {} panicked: {}", page_num, detail);
                        ExtractionRecord::failed(PageError::Unexpected { detail })
                    });

                match record.error() {
                    None => {
                        info!("Page {}: {} fields", page_num, record.field_count());
                        if let Some(cb) = callback {
                            cb.on_page_complete(page_num, total_pages, record.field_count());
                        }
                    }
                    Some(e) => {
                        warn!("Page {} failed: {}", page_num, e);
                        if let Some(cb) = callback {
                            cb.on_page_error(page_num, total_pages, e);
                        }
                    }
                }

                (page_num, record)
            }
            .instrument(info_span!("page", n = page_num))
        }))
        .buffered(config.concurrency)
        .collect()
        .await;

    // ── Step 5: Assemble ─────────────────────────────────────────────────
    let mut pages = PageResultMap::with_capacity(records.len());
    for (page_num, record) in records {
        pages.insert(page_num, record);
    }

    let success_count = total_pages - pages.error_count();
    info!(
        "Extraction complete: {}/{} pages, {}ms total",
        success_count,
        total_pages,
        total_start.elapsed().as_millis()
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_complete(total_pages, success_count);
    }

    Ok(pages)
}

/// Extract from PDF bytes held in memory.
///
/// The bytes are written to a managed [`tempfile`] that is removed when this
/// returns.
pub async fn extract_from_bytes(
    bytes: &[u8],
    doc_type: &str,
    config: &ExtractionConfig,
) -> Result<PageResultMap, ExtractError> {
    let mut tmp = tempfile::Builder::new()
        .prefix("taxdoc-")
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| ExtractError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| ExtractError::Internal(format!("tempfile write: {e}")))?;
    tmp.flush()
        .map_err(|e| ExtractError::Internal(format!("tempfile write: {e}")))?;
    extract_document(tmp.path(), doc_type, config).await
}

/// Extract and write the JSON blob to `output`.
///
/// A whole-document failure is written as `{ "error": "<reason>" }`, so the
/// file always exists afterwards. Only I/O failures are returned as `Err`.
/// The write is atomic (temp file + rename).
pub async fn extract_to_file(
    source: impl AsRef<Path>,
    doc_type: &str,
    output: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<DocumentExtraction, ExtractError> {
    let extraction = DocumentExtraction::from(extract_document(source, doc_type, config).await);
    let path = output.as_ref();

    let json = extraction
        .to_json_pretty()
        .map_err(|e| ExtractError::Internal(format!("serialize result: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ExtractError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json)
        .await
        .map_err(|e| ExtractError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| ExtractError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    info!("Wrote {}", path.display());
    Ok(extraction)
}

/// Synchronous wrapper around [`extract_document`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    source: impl AsRef<Path>,
    doc_type: &str,
    config: &ExtractionConfig,
) -> Result<PageResultMap, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_document(source, doc_type, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn default_rasterizer(config: &ExtractionConfig) -> Arc<dyn Rasterizer> {
    match config.rasterizer {
        Some(ref r) => Arc::clone(r),
        None => Arc::new(
            PdfiumRasterizer::new(config.max_rendered_pixels)
                .with_password(config.password.clone())
                .with_library_path(config.pdfium_library_path.clone()),
        ),
    }
}

/// Run the rasterizer on the blocking pool.
async fn rasterize(
    source: &Path,
    config: &ExtractionConfig,
) -> Result<Vec<DynamicImage>, ExtractError> {
    let rasterizer = default_rasterizer(config);
    let path = source.to_path_buf();

    tokio::task::spawn_blocking(move || rasterizer.render(&path))
        .await
        .unwrap_or_else(|e| Err(RasterError::Task(e.to_string())))
        .map_err(|e| {
            error!("Failed PDF-to-image conversion: {}", e);
            ExtractError::Rasterization {
                path: source.to_path_buf(),
                reason: e.to_string(),
            }
        })
}

/// Encode one page and hand it to the page extractor.
///
/// `image` is dropped as soon as the PNG exists, on every path.
async fn process_page(
    model: &dyn VisionModel,
    image: DynamicImage,
    doc_type: &str,
    options: &PageOptions,
) -> ExtractionRecord {
    let png = encode_png(&image);
    drop(image);

    match png {
        Ok(png) => extract_page(model, &png, doc_type, options).await,
        Err(e) => ExtractionRecord::failed(PageError::Unexpected {
            detail: format!("image encoding failed: {e}"),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "page task panicked".to_string()
    }
}
