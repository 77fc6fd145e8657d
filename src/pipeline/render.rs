//! Page sources: turn one document into an ordered list of page images.
//!
//! [`PageSource`] is the seam between the batch engine and rasterisation.
//! The batch only needs "document bytes in, ordered page images out"; tests
//! plug in a fake, production uses [`RasterPageSource`].
//!
//! ## Why synchronous?
//!
//! pdfium wraps a C++ library with thread-local state and is not safe to
//! drive from async code, and LibreOffice is an external process. The batch
//! calls [`PageSource::convert`] inside `tokio::task::spawn_blocking`, so
//! implementations are free to block.

use crate::document::{DocumentKind, PageImage};
use crate::error::PageSourceError;
use crate::pipeline::discover::natural_sort_key;
use crate::config::BatchConfig;
use crate::pipeline::encode;
use crate::pipeline::orient::OrientationCorrector;
use pdfium_render::prelude::*;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;
use tracing::{debug, info};

/// Converts a document into ordered page images.
pub trait PageSource: Send + Sync {
    fn convert(&self, bytes: &[u8], kind: DocumentKind) -> Result<Vec<PageImage>, PageSourceError>;
}

/// Production page source: pdfium for PDF, LibreOffice for DOCX, passthrough
/// for single images.
///
/// Rendered pages can be rotated upright with [`OrientationCorrector`];
/// single images and image folders are sent as they are.
#[derive(Debug, Clone)]
pub struct RasterPageSource {
    max_rendered_pixels: u32,
    soffice: String,
    orientation: Option<OrientationCorrector>,
}

impl Default for RasterPageSource {
    fn default() -> Self {
        Self::new(2000)
    }
}

impl RasterPageSource {
    pub fn new(max_rendered_pixels: u32) -> Self {
        Self {
            max_rendered_pixels,
            soffice: "soffice".to_string(),
            orientation: None,
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        let source = Self::new(config.max_rendered_pixels);
        if config.correct_orientation {
            source.with_orientation_correction(OrientationCorrector::default())
        } else {
            source
        }
    }

    /// Rotate each rendered page upright before encoding.
    pub fn with_orientation_correction(mut self, corrector: OrientationCorrector) -> Self {
        self.orientation = Some(corrector);
        self
    }

    /// Use a specific LibreOffice executable for DOCX conversion.
    pub fn with_soffice(mut self, command: impl Into<String>) -> Self {
        self.soffice = command.into();
        self
    }

    fn render_pdf(&self, bytes: &[u8]) -> Result<Vec<PageImage>, PageSourceError> {
        let pdfium = bind_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| PageSourceError::ConversionError(format!("cannot open PDF: {e:?}")))?;

        let pages = document.pages();
        let total = pages.len() as usize;
        if total == 0 {
            return Err(PageSourceError::ConversionError(
                "PDF has no pages".to_string(),
            ));
        }
        info!("PDF loaded: {} pages", total);

        let render_config = PdfRenderConfig::new()
            .set_target_width(self.max_rendered_pixels as i32)
            .set_maximum_height(self.max_rendered_pixels as i32);

        let mut images = Vec::with_capacity(total);
        for (idx, page) in pages.iter().enumerate() {
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                PageSourceError::ConversionError(format!("page {}: {e:?}", idx + 1))
            })?;
            let mut image = bitmap.as_image();
            debug!("Rendered page {} → {}x{} px", idx + 1, image.width(), image.height());
            if let Some(ref corrector) = self.orientation {
                image = corrector.correct(image, idx + 1);
            }
            let page_image = encode::encode_png(&image).map_err(|e| {
                PageSourceError::ConversionError(format!("page {}: PNG encoding failed: {e}", idx + 1))
            })?;
            images.push(page_image);
        }
        Ok(images)
    }

    fn docx_to_pdf(&self, bytes: &[u8]) -> Result<Vec<u8>, PageSourceError> {
        let tmp = TempDir::new()
            .map_err(|e| PageSourceError::ConversionError(format!("tempdir: {e}")))?;
        let input = tmp.path().join("input.docx");
        std::fs::write(&input, bytes)
            .map_err(|e| PageSourceError::ConversionError(format!("tempfile write: {e}")))?;

        let output = Command::new(&self.soffice)
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(tmp.path())
            .arg(&input)
            .output();

        match output {
            Ok(out) if out.status.success() => {}
            Ok(out) => {
                return Err(PageSourceError::ConversionError(format!(
                    "DOCX to PDF conversion failed: {}",
                    String::from_utf8_lossy(&out.stderr).trim()
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PageSourceError::ConversionError(format!(
                    "'{}' not found; LibreOffice is required to convert .docx files",
                    self.soffice
                )));
            }
            Err(e) => {
                return Err(PageSourceError::ConversionError(format!(
                    "failed to run '{}': {e}",
                    self.soffice
                )));
            }
        }

        std::fs::read(tmp.path().join("input.pdf")).map_err(|e| {
            PageSourceError::ConversionError(format!("converted PDF missing: {e}"))
        })
    }
}

impl PageSource for RasterPageSource {
    fn convert(&self, bytes: &[u8], kind: DocumentKind) -> Result<Vec<PageImage>, PageSourceError> {
        match kind {
            DocumentKind::Pdf => self.render_pdf(bytes),
            DocumentKind::Docx => {
                let pdf = self.docx_to_pdf(bytes)?;
                self.render_pdf(&pdf)
            }
            DocumentKind::Image => Ok(vec![sniff_image(bytes)?]),
            DocumentKind::ImageFolder => Err(PageSourceError::UnsupportedFormat(
                "image folders are read page by page, not converted".to_string(),
            )),
        }
    }
}

/// Bind pdfium from `PDFIUM_LIB_PATH`, the working directory, or the system.
fn bind_pdfium() -> Result<Pdfium, PageSourceError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(path),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| PageSourceError::ConversionError(format!("cannot load pdfium: {e:?}")))?;
    Ok(Pdfium::new(bindings))
}

/// Identify a standalone PNG or JPEG by its magic bytes.
fn sniff_image(bytes: &[u8]) -> Result<PageImage, PageSourceError> {
    if bytes.starts_with(b"\x89PNG") {
        Ok(PageImage::png(bytes.to_vec()))
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Ok(PageImage::jpeg(bytes.to_vec()))
    } else {
        Err(PageSourceError::UnsupportedFormat(
            "image is neither PNG nor JPEG".to_string(),
        ))
    }
}

/// Read every page image of an image-folder document, in natural order
/// (`page2.png` before `page10.png`).
pub fn read_image_folder(dir: &Path) -> Result<Vec<PageImage>, PageSourceError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| PageSourceError::ConversionError(format!("cannot read folder: {e}")))?;

    let mut files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && DocumentKind::from_file_path(p) == Some(DocumentKind::Image))
        .collect();
    files.sort_by_cached_key(|p| {
        natural_sort_key(&p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default())
    });

    if files.is_empty() {
        return Err(PageSourceError::ConversionError(
            "folder contains no page images".to_string(),
        ));
    }

    files
        .iter()
        .map(|p| {
            std::fs::read(p)
                .map(|bytes| PageImage::from_file_bytes(p, bytes))
                .map_err(|e| {
                    PageSourceError::ConversionError(format!("cannot read {}: {e}", p.display()))
                })
        })
        .collect()
}
