//! Print Surface - PDF Canvas
//!
//! `Canvas` is the seam between layout and the PDF writer. `PdfCanvas` renders
//! into a temp file beside the destination and only takes its final name once
//! every page has been written.

use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use printpdf::image_crate;
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Line, Mm, PdfDocumentReference,
    PdfLayerReference, Point, Pt, Rgb,
};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::layout::CardRect;
use crate::metrics::{BuiltinFace, FontMetrics};
use crate::templates::{CardColor, SheetSpec};

#[derive(Debug, Error)]
#[error("Font {} unavailable: {reason}", .path.display())]
pub struct FontUnavailable {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("No font selected")]
    NoFont,

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("Image {} could not be placed: {reason}", .path.display())]
    Image { path: PathBuf, reason: String },

    #[error("QR code error: {0}")]
    Qr(#[from] crate::qr::QrError),

    #[error("Output I/O error on {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),
}

/// The font a canvas ended up drawing with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActiveFont {
    Embedded { path: PathBuf },
    Builtin { face: BuiltinFace },
}

pub trait Canvas {
    /// Embeds a TrueType font, makes it current, and returns its own widths.
    fn try_register_font(&mut self, path: &Path) -> Result<FontMetrics, FontUnavailable>;
    fn use_builtin_font(&mut self, face: BuiltinFace) -> Result<(), RenderError>;
    fn stroke_rect(&mut self, rect: CardRect, color: CardColor, line_width: f64);
    /// Draws `text` with its baseline starting at (`x`, `y`).
    fn draw_text(
        &mut self,
        text: &str,
        x: f64,
        y: f64,
        size: f64,
        color: CardColor,
    ) -> Result<(), RenderError>;
    /// Places a square raster image with its bottom-left corner at (`x`, `y`).
    fn draw_image(&mut self, path: &Path, x: f64, y: f64, size: f64) -> Result<(), RenderError>;
    fn show_page(&mut self);
}

#[derive(Debug, Clone, Default)]
pub struct DocumentInfo {
    pub title: String,
    pub author: String,
    pub subject: String,
}

pub struct PdfCanvas {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    font: Option<IndirectFontRef>,
    page_width: Mm,
    page_height: Mm,
    pages: usize,
}

fn mm(points: f64) -> Mm {
    Mm::from(Pt(points as f32))
}

fn pdf_color(color: CardColor) -> Color {
    let (r, g, b) = color.unit();
    Color::Rgb(Rgb::new(r as f32, g as f32, b as f32, None))
}

impl PdfCanvas {
    pub fn new(sheet: &SheetSpec, info: &DocumentInfo) -> Self {
        let page_width = mm(sheet.page_width);
        let page_height = mm(sheet.page_height);
        let (doc, page, layer) =
            printpdf::PdfDocument::new(info.title.clone(), page_width, page_height, String::from("Cards"));
        let doc = doc
            .with_author(&info.author)
            .with_subject(&info.subject)
            .with_creator(format!("cardpress {}", crate::ENGINE_VERSION));
        let layer = doc.get_page(page).get_layer(layer);
        Self {
            doc,
            layer,
            font: None,
            page_width,
            page_height,
            pages: 1,
        }
    }

    /// Serializes the document to a temp file in `dir`. Nothing appears under a
    /// final name until [`RenderedPdf::persist`].
    pub fn finish(self, dir: &Path) -> Result<RenderedPdf, RenderError> {
        let file = tempfile::Builder::new()
            .prefix(".cards-")
            .suffix(".pdf.partial")
            .tempfile_in(dir)
            .map_err(|e| RenderError::Io(dir.to_path_buf(), e))?;
        let handle = file
            .reopen()
            .map_err(|e| RenderError::Io(file.path().to_path_buf(), e))?;
        let mut writer = BufWriter::new(handle);
        self.doc
            .save(&mut writer)
            .map_err(|e| RenderError::Pdf(e.to_string()))?;
        let handle = writer
            .into_inner()
            .map_err(|e| RenderError::Io(file.path().to_path_buf(), e.into_error()))?;
        handle
            .sync_all()
            .map_err(|e| RenderError::Io(file.path().to_path_buf(), e))?;
        Ok(RenderedPdf {
            file,
            pages: self.pages,
        })
    }
}

impl Canvas for PdfCanvas {
    fn try_register_font(&mut self, path: &Path) -> Result<FontMetrics, FontUnavailable> {
        let unavailable = |reason: String| FontUnavailable {
            path: path.to_path_buf(),
            reason,
        };
        let data = fs::read(path).map_err(|e| unavailable(e.to_string()))?;
        let metrics = FontMetrics::from_ttf(&data).map_err(|e| unavailable(e.to_string()))?;
        let font = self
            .doc
            .add_external_font(data.as_slice())
            .map_err(|e| unavailable(e.to_string()))?;
        self.font = Some(font);
        Ok(metrics)
    }

    fn use_builtin_font(&mut self, face: BuiltinFace) -> Result<(), RenderError> {
        let builtin = match face {
            BuiltinFace::Helvetica => BuiltinFont::Helvetica,
            BuiltinFace::TimesRoman => BuiltinFont::TimesRoman,
            BuiltinFace::Courier => BuiltinFont::Courier,
        };
        let font = self
            .doc
            .add_builtin_font(builtin)
            .map_err(|e| RenderError::Pdf(e.to_string()))?;
        self.font = Some(font);
        Ok(())
    }

    fn stroke_rect(&mut self, rect: CardRect, color: CardColor, line_width: f64) {
        let corners = [
            (rect.x, rect.y),
            (rect.x + rect.width, rect.y),
            (rect.x + rect.width, rect.y + rect.height),
            (rect.x, rect.y + rect.height),
        ];
        let outline = Line {
            points: corners
                .iter()
                .map(|&(x, y)| (Point::new(mm(x), mm(y)), false))
                .collect(),
            is_closed: true,
        };
        self.layer.set_outline_color(pdf_color(color));
        self.layer.set_outline_thickness(line_width as f32);
        self.layer.add_line(outline);
    }

    fn draw_text(
        &mut self,
        text: &str,
        x: f64,
        y: f64,
        size: f64,
        color: CardColor,
    ) -> Result<(), RenderError> {
        let font = self.font.as_ref().ok_or(RenderError::NoFont)?;
        self.layer.set_fill_color(pdf_color(color));
        self.layer.use_text(text, size as f32, mm(x), mm(y), font);
        Ok(())
    }

    fn draw_image(&mut self, path: &Path, x: f64, y: f64, size: f64) -> Result<(), RenderError> {
        let img_err = |reason: String| RenderError::Image {
            path: path.to_path_buf(),
            reason,
        };
        let raster = image_crate::open(path).map_err(|e| img_err(e.to_string()))?;
        let pixels = raster.width();
        if pixels == 0 || size <= 0.0 {
            return Err(img_err("empty image".to_string()));
        }
        // At `dpi` = pixels * 72 / size the image spans exactly `size` points.
        let dpi = pixels as f32 * 72.0 / size as f32;
        Image::from_dynamic_image(&raster).add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(mm(x)),
                translate_y: Some(mm(y)),
                dpi: Some(dpi),
                ..Default::default()
            },
        );
        Ok(())
    }

    fn show_page(&mut self) {
        let (page, layer) = self
            .doc
            .add_page(self.page_width, self.page_height, "Cards");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.pages += 1;
        debug!(page = self.pages, "Started page");
    }
}

/// A fully written PDF still under its temporary name.
pub struct RenderedPdf {
    file: NamedTempFile,
    pages: usize,
}

impl RenderedPdf {
    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn bytes(&self) -> Result<Vec<u8>, RenderError> {
        fs::read(self.file.path()).map_err(|e| RenderError::Io(self.file.path().to_path_buf(), e))
    }

    /// Moves the PDF to `dest`. Fails rather than overwrite an existing file.
    pub fn persist(self, dest: &Path) -> Result<PathBuf, RenderError> {
        self.file
            .persist_noclobber(dest)
            .map_err(|e| RenderError::Io(dest.to_path_buf(), e.error))?;
        Ok(dest.to_path_buf())
    }
}
