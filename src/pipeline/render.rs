//! PDF rasterisation: every page of a document to a `DynamicImage`.
//!
//! The [`Rasterizer`] trait is blocking; the aggregator runs it inside
//! `tokio::task::spawn_blocking` because pdfium keeps thread-local state and
//! page rendering is CPU-bound.
//!
//! Images are capped at `max_rendered_pixels` on the longest edge so an
//! oversized page (A0 drawings, 600 DPI scans) cannot exhaust memory or blow
//! past the model's upload limit.

use crate::error::RasterError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming a pdfium library file or its directory.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Turns a source document into one image per page, in page order.
pub trait Rasterizer: Send + Sync {
    fn render(&self, source: &Path) -> Result<Vec<DynamicImage>, RasterError>;
}

/// pdfium-backed [`Rasterizer`].
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    max_pixels: u32,
    password: Option<String>,
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(max_pixels: u32) -> Self {
        Self {
            max_pixels,
            password: None,
            library_path: None,
        }
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    pub fn with_library_path(mut self, path: Option<PathBuf>) -> Self {
        self.library_path = path;
        self
    }

    /// Bind in order: `PDFIUM_LIB_PATH`, the configured path, the system library.
    fn bind(&self) -> Result<Pdfium, RasterError> {
        let env_path = std::env::var_os(PDFIUM_LIB_PATH_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        for candidate in env_path.iter().chain(self.library_path.iter()) {
            let lib = if candidate.is_dir() {
                PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(candidate))
            } else {
                candidate.clone()
            };
            match Pdfium::bind_to_library(&lib) {
                Ok(bindings) => {
                    debug!("Bound pdfium from {}", lib.display());
                    return Ok(Pdfium::new(bindings));
                }
                Err(e) => debug!("pdfium not loadable from {}: {:?}", lib.display(), e),
            }
        }

        Pdfium::bind_to_system_library()
            .map(Pdfium::new)
            .map_err(|e| RasterError::Binding(format!("{e:?}")))
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn render(&self, source: &Path) -> Result<Vec<DynamicImage>, RasterError> {
        let pdfium = self.bind()?;
        let password = self.password.as_deref();

        let document = pdfium
            .load_pdf_from_file(source, password)
            .map_err(|e| classify_load_error(source, password.is_some(), format!("{e:?}")))?;

        let pages = document.pages();
        let total = pages.len() as usize;
        info!("PDF loaded: {} pages", total);

        let render_config = PdfRenderConfig::new()
            .set_target_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        let mut images = Vec::with_capacity(total);
        for (idx, page) in pages.iter().enumerate() {
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| RasterError::PageRender {
                    page: idx + 1,
                    detail: format!("{e:?}"),
                })?;
            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            images.push(image);
        }

        Ok(images)
    }
}

fn classify_load_error(path: &Path, had_password: bool, detail: String) -> RasterError {
    if detail.to_ascii_lowercase().contains("password") {
        if had_password {
            RasterError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            RasterError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        RasterError::Corrupt {
            path: path.to_path_buf(),
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_errors_are_classified() {
        let p = Path::new("locked.pdf");
        assert!(matches!(
            classify_load_error(p, false, "PdfiumLibraryInternalError(PasswordError)".into()),
            RasterError::PasswordRequired { .. }
        ));
        assert!(matches!(
            classify_load_error(p, true, "PdfiumLibraryInternalError(PasswordError)".into()),
            RasterError::WrongPassword { .. }
        ));
        assert!(matches!(
            classify_load_error(p, false, "PdfiumLibraryInternalError(FormatError)".into()),
            RasterError::Corrupt { .. }
        ));
    }
}
