//! QR Raster - Scoped Temporary PNG
//!
//! Each QR code lives in its own temp file for exactly one draw call. The file
//! is removed when the [`QrImage`] drops, whether or not the draw succeeded.

use std::path::Path;

use printpdf::image_crate::{GrayImage, ImageFormat, Luma};
use qrcode::{Color, EcLevel, QrCode};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Pixels per QR module.
pub const BOX_SIZE: u32 = 10;
/// Quiet zone in modules.
pub const BORDER: u32 = 1;

#[derive(Debug, Error)]
pub enum QrError {
    #[error("QR encoding failed: {0}")]
    Encode(#[from] qrcode::types::QrError),

    #[error("QR image write failed: {0}")]
    Write(String),
}

pub struct QrImage {
    file: NamedTempFile,
}

impl QrImage {
    /// Encodes `payload` and writes it as a PNG into `scratch_dir`.
    pub fn create(payload: &str, scratch_dir: &Path) -> Result<Self, QrError> {
        let raster = rasterize(payload)?;

        let file = tempfile::Builder::new()
            .prefix("card-qr-")
            .suffix(".png")
            .tempfile_in(scratch_dir)
            .map_err(|e| QrError::Write(e.to_string()))?;
        raster
            .save_with_format(file.path(), ImageFormat::Png)
            .map_err(|e| QrError::Write(e.to_string()))?;

        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Black-on-white raster, smallest version that fits at error correction level M.
pub fn rasterize(payload: &str) -> Result<GrayImage, QrError> {
    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::M)?;
    let modules = code.width() as u32;
    let colors = code.to_colors();
    let side = (modules + 2 * BORDER) * BOX_SIZE;

    Ok(GrayImage::from_fn(side, side, |px, py| {
        let (mx, my) = (px / BOX_SIZE, py / BOX_SIZE);
        let inside = (BORDER..BORDER + modules).contains(&mx)
            && (BORDER..BORDER + modules).contains(&my);
        let dark = inside
            && colors[((my - BORDER) * modules + (mx - BORDER)) as usize] == Color::Dark;
        if dark { Luma([0u8]) } else { Luma([255u8]) }
    }))
}
