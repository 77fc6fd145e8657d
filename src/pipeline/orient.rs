//! Optional page orientation correction for rendered pages.
//!
//! Scans are often fed through the scanner sideways or upside down. When
//! enabled, each rendered page is run through tesseract's orientation and
//! script detection (`--psm 0`), and its `Rotate:` answer is applied before
//! the page is encoded. Tesseract reports the clockwise rotation that makes
//! the page upright, which maps directly onto `image`'s clockwise rotations.
//!
//! Detection failures never fail the page. The image is kept as it was and
//! a warning is logged.

use crate::error::PageSourceError;
use crate::pipeline::encode;
use image::DynamicImage;
use std::process::Command;
use tracing::{debug, warn};

/// Runs tesseract OSD over rendered pages and rotates them upright.
#[derive(Debug, Clone)]
pub struct OrientationCorrector {
    tesseract: String,
}

impl Default for OrientationCorrector {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl OrientationCorrector {
    pub fn new(tesseract: impl Into<String>) -> Self {
        Self {
            tesseract: tesseract.into(),
        }
    }

    /// Return `image` rotated upright, or unchanged if detection fails.
    pub fn correct(&self, image: DynamicImage, page_num: usize) -> DynamicImage {
        match self.detect(&image) {
            Ok(0) => image,
            Ok(degrees) => {
                debug!("Page {}: rotating {}° clockwise", page_num, degrees);
                rotate_clockwise(image, degrees)
            }
            Err(e) => {
                warn!("Page {}: orientation detection failed: {}", page_num, e);
                image
            }
        }
    }

    /// Clockwise rotation in degrees tesseract recommends for `image`.
    pub fn detect(&self, image: &DynamicImage) -> Result<u32, PageSourceError> {
        let png = encode::encode_png(image)
            .map_err(|e| PageSourceError::ConversionError(format!("PNG encoding failed: {e}")))?;
        let file = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .map_err(|e| PageSourceError::ConversionError(format!("tempfile: {e}")))?;
        std::fs::write(file.path(), &png.bytes)
            .map_err(|e| PageSourceError::ConversionError(format!("tempfile write: {e}")))?;

        let output = Command::new(&self.tesseract)
            .arg(file.path())
            .arg("-")
            .arg("--psm")
            .arg("0")
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => PageSourceError::ConversionError(format!(
                    "'{}' not found; tesseract is required for orientation correction",
                    self.tesseract
                )),
                _ => PageSourceError::ConversionError(format!("failed to run '{}': {e}", self.tesseract)),
            })?;

        if !output.status.success() {
            return Err(PageSourceError::ConversionError(format!(
                "tesseract OSD failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_osd_rotation(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            PageSourceError::ConversionError("no Rotate: line in tesseract output".to_string())
        })
    }
}

/// Extract the `Rotate:` value from tesseract `--psm 0` output.
pub fn parse_osd_rotation(osd: &str) -> Option<u32> {
    osd.lines()
        .find_map(|line| line.trim().strip_prefix("Rotate:"))
        .and_then(|value| value.trim().parse().ok())
}

/// Rotate by a multiple of 90° clockwise. Other angles are ignored.
pub fn rotate_clockwise(image: DynamicImage, degrees: u32) -> DynamicImage {
    match degrees % 360 {
        90 => image.rotate90(),
        180 => image.rotate180(),
        270 => image.rotate270(),
        _ => image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};

    const OSD: &str = "Page number: 0\n\
                       Orientation in degrees: 270\n\
                       Rotate: 90\n\
                       Orientation confidence: 1.52\n\
                       Script: Latin\n\
                       Script confidence: 2.00\n";

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    /// Two pixels side by side: red then blue.
    fn strip() -> DynamicImage {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, RED);
        img.put_pixel(1, 0, BLUE);
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn parses_rotate_line() {
        assert_eq!(parse_osd_rotation(OSD), Some(90));
        assert_eq!(parse_osd_rotation("Rotate: 0"), Some(0));
    }

    #[test]
    fn missing_or_garbled_rotate_line() {
        assert_eq!(parse_osd_rotation("Too few characters. Skipping this page"), None);
        assert_eq!(parse_osd_rotation("Rotate: sideways"), None);
    }

    #[test]
    fn quarter_turn_clockwise() {
        let rotated = rotate_clockwise(strip(), 90);
        assert_eq!(rotated.dimensions(), (1, 2));
        assert_eq!(rotated.get_pixel(0, 0), RED);
        assert_eq!(rotated.get_pixel(0, 1), BLUE);
    }

    #[test]
    fn half_turn_and_unknown_angles() {
        let flipped = rotate_clockwise(strip(), 180);
        assert_eq!(flipped.dimensions(), (2, 1));
        assert_eq!(flipped.get_pixel(0, 0), BLUE);

        let same = rotate_clockwise(strip(), 45);
        assert_eq!(same.get_pixel(0, 0), RED);
    }

    #[test]
    fn missing_tesseract_leaves_page_unchanged() {
        let corrector = OrientationCorrector::new("definitely-not-tesseract-42");
        let err = corrector.detect(&strip()).unwrap_err();
        assert!(err.to_string().contains("not found"), "got: {err}");

        let page = corrector.correct(strip(), 1);
        assert_eq!(page.dimensions(), (2, 1));
        assert_eq!(page.get_pixel(0, 0), RED);
    }
}
