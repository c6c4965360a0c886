//! Pipeline stages for per-page extraction.
//!
//! Each submodule implements one transformation step and is tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! render ──▶ encode ──▶ page ──▶ recover
//! (pdfium)   (PNG)      (model)  (JSON)
//! ```
//!
//! 1. [`render`]  rasterise every page; blocking, run via `spawn_blocking`
//! 2. [`encode`]  PNG-encode one page image
//! 3. [`page`]    call the vision model with retry, timeout and diagnostics
//! 4. [`recover`] turn reply text into a field map

pub mod encode;
pub mod page;
pub mod recover;
pub mod render;
