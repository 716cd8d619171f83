//! Rasterisation: turn a [`SourceFile`] into an ordered list of page images.
//!
//! Screenshots pass through untouched. PDFs are rendered page by page with
//! pdfium at a fixed upscaling factor (≥ 2×) so comment text stays legible
//! to the model, then PNG-encoded.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state; it is CPU-bound and not
//! async-safe. `tokio::task::spawn_blocking` keeps rendering off the runtime's
//! worker threads.
//!
//! ## Binding
//!
//! pdfium is loaded at runtime. The configured library path (or
//! `PDFIUM_LIB_PATH`) is tried first, then the system library search path.
//! When neither binds, rasterisation fails with
//! [`FileError::RasterizationUnavailable`] instead of panicking, so a
//! missing backend degrades PDFs without touching screenshots.

use super::encode::encode_png;
use super::input::{MediaKind, SourceFile};
use crate::config::ExtractionConfig;
use crate::error::FileError;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// One unit of model input: a screenshot, or one rendered PDF page.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// Encoded image bytes (original bytes for screenshots, PNG for PDF pages).
    pub data: Arc<[u8]>,
    /// MIME type matching `data`.
    pub mime_type: String,
    /// Name of the source file.
    pub source_name: String,
    /// 1-indexed page number; only set for pages of a PDF.
    pub page: Option<usize>,
}

impl PageImage {
    /// File name, annotated with the page number for PDF pages.
    pub fn display_name(&self) -> String {
        match self.page {
            Some(n) => format!("{} (Page {})", self.source_name, n),
            None => self.source_name.clone(),
        }
    }
}

/// Produces page images from a source file.
///
/// The orchestrator only talks to this trait, which keeps the pdfium
/// dependency out of its tests.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    async fn rasterize(&self, source: &SourceFile) -> Result<Vec<PageImage>, FileError>;
}

/// A screenshot becomes exactly one page image with its bytes unchanged.
pub fn passthrough(source: &SourceFile) -> PageImage {
    PageImage {
        data: Arc::clone(source.data()),
        mime_type: source.mime_type().to_string(),
        source_name: source.name().to_string(),
        page: None,
    }
}

/// pdfium-backed rasteriser.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    scale: f32,
    max_pixels: u32,
    password: Option<String>,
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(scale: f32, max_pixels: u32) -> Self {
        Self {
            scale: scale.max(2.0),
            max_pixels,
            password: None,
            library_path: None,
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            scale: config.render_scale.max(2.0),
            max_pixels: config.max_rendered_pixels,
            password: config.password.clone(),
            library_path: config.pdfium_lib_path.clone(),
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    async fn render_pdf(&self, source: &SourceFile) -> Result<Vec<PageImage>, FileError> {
        let data = Arc::clone(source.data());
        let name = source.name().to_string();
        let this = self.clone();

        tokio::task::spawn_blocking(move || this.render_pdf_blocking(&data, &name))
            .await
            .map_err(|e| FileError::Internal(format!("Render task panicked: {}", e)))?
    }

    /// Blocking implementation of PDF rendering.
    fn render_pdf_blocking(&self, data: &[u8], name: &str) -> Result<Vec<PageImage>, FileError> {
        let pdfium = bind_pdfium(self.library_path.as_deref())?;

        let document = pdfium
            .load_pdf_from_byte_slice(data, self.password.as_deref())
            .map_err(|e| {
                let err_str = format!("{:?}", e);
                if err_str.contains("Password") || err_str.contains("password") {
                    FileError::PasswordRequired
                } else {
                    FileError::CorruptDocument { detail: err_str }
                }
            })?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("{}: {} pages", name, total_pages);

        if total_pages == 0 {
            return Err(FileError::CorruptDocument {
                detail: "document has no pages".into(),
            });
        }

        let mut results = Vec::with_capacity(total_pages);

        for (idx, page) in pages.iter().enumerate() {
            let page_num = idx + 1;
            let (width, height) = self.target_size(page.width().value, page.height().value);

            let render_config = PdfRenderConfig::new()
                .set_target_width(width)
                .set_target_height(height);

            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| FileError::RenderFailed {
                    page: page_num,
                    detail: format!("{:?}", e),
                })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered {} page {} → {}x{} px",
                name,
                page_num,
                image.width(),
                image.height()
            );

            let png = encode_png(&image).map_err(|e| FileError::EncodeFailed {
                page: page_num,
                detail: e.to_string(),
            })?;

            results.push(PageImage {
                data: Arc::from(png),
                mime_type: "image/png".to_string(),
                source_name: name.to_string(),
                page: Some(page_num),
            });
        }

        Ok(results)
    }

    /// Pixel size for a page of `width_pts` × `height_pts` points: scaled by
    /// the upscaling factor, then capped so the longest edge fits
    /// `max_pixels`.
    fn target_size(&self, width_pts: f32, height_pts: f32) -> (i32, i32) {
        let mut w = width_pts * self.scale;
        let mut h = height_pts * self.scale;
        let longest = w.max(h);
        if longest > self.max_pixels as f32 {
            let shrink = self.max_pixels as f32 / longest;
            w *= shrink;
            h *= shrink;
        }
        ((w.round() as i32).max(1), (h.round() as i32).max(1))
    }
}

#[async_trait]
impl PageRasterizer for PdfiumRasterizer {
    async fn rasterize(&self, source: &SourceFile) -> Result<Vec<PageImage>, FileError> {
        match source.kind() {
            MediaKind::Image => Ok(vec![passthrough(source)]),
            MediaKind::Pdf => self.render_pdf(source).await,
        }
    }
}

/// Bind to pdfium: explicit path or `PDFIUM_LIB_PATH` first, then the system
/// library.
fn bind_pdfium(explicit: Option<&Path>) -> Result<Pdfium, FileError> {
    let configured = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

    let bindings = match configured {
        Some(path) => {
            let lib = if path.is_dir() {
                path.join(platform_library_name())
            } else {
                path
            };
            Pdfium::bind_to_library(&lib).or_else(|_| Pdfium::bind_to_system_library())
        }
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| FileError::RasterizationUnavailable {
        detail: format!(
            "could not load the pdfium library ({e:?}); set PDFIUM_LIB_PATH to a libpdfium build"
        ),
    })?;

    Ok(Pdfium::new(bindings))
}

fn platform_library_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "pdfium.dll"
    } else if cfg!(target_os = "macos") {
        "libpdfium.dylib"
    } else {
        "libpdfium.so"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_annotates_pages() {
        let mut page = PageImage {
            data: Arc::from(&b""[..]),
            mime_type: "image/png".into(),
            source_name: "export.pdf".into(),
            page: Some(3),
        };
        assert_eq!(page.display_name(), "export.pdf (Page 3)");
        page.page = None;
        assert_eq!(page.display_name(), "export.pdf");
    }

    #[test]
    fn image_passes_through_unchanged() {
        let source = SourceFile::new("shot.webp", "image/webp", b"RIFFxxxxWEBP".to_vec());
        let pages = tokio_test::block_on(PdfiumRasterizer::new(2.0, 4000).rasterize(&source))
            .expect("images never need pdfium");
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].mime_type, "image/webp");
        assert_eq!(pages[0].page, None);
        assert!(Arc::ptr_eq(&pages[0].data, source.data()));
    }

    #[test]
    fn target_size_upscales_letter_page() {
        let r = PdfiumRasterizer::new(2.0, 4000);
        assert_eq!(r.target_size(612.0, 792.0), (1224, 1584));
    }

    #[test]
    fn target_size_caps_longest_edge() {
        let r = PdfiumRasterizer::new(4.0, 2000);
        let (w, h) = r.target_size(612.0, 1584.0);
        assert_eq!(h, 2000);
        assert!(w < h);
    }

    #[test]
    fn scale_never_drops_below_two() {
        let r = PdfiumRasterizer::new(1.0, 4000);
        assert_eq!(r.target_size(100.0, 100.0), (200, 200));
    }

    #[test]
    fn missing_library_is_reported_not_panicked() {
        let err = bind_pdfium(Some(Path::new("/nonexistent/libpdfium.so")));
        // On machines with a system pdfium this binds successfully; otherwise
        // it must surface as RasterizationUnavailable.
        if let Err(e) = err {
            assert!(matches!(e, FileError::RasterizationUnavailable { .. }));
        }
    }
}
