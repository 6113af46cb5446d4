//! Print Pipeline - Single Entry Point
//!
//! `print` always validates the template first. Card numbers reach the ledger
//! only after the PDF has been rendered and moved to its final name.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::hashing::{compute_job_hash, compute_manifest_hash, sha256_hex};
use crate::layout::{compose_card, paginate, CardRect, DrawOp, PagePlan};
use crate::ledger::{Allocation, Ledger, LedgerError, LedgerRecord};
use crate::metrics::FontMetrics;
use crate::print::{ActiveFont, Canvas, DocumentInfo, PdfCanvas, RenderError};
use crate::qr::QrImage;
use crate::templates::CardTemplate;
use crate::validation::{ValidationResult, Validator};
use crate::ENGINE_VERSION;

#[cfg(feature = "test-hooks")]
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "test-hooks")]
static VALIDATION_CALL_COUNT: AtomicU32 = AtomicU32::new(0);

#[cfg(feature = "test-hooks")]
pub fn get_validation_call_count() -> u32 {
    VALIDATION_CALL_COUNT.load(Ordering::SeqCst)
}

#[cfg(feature = "test-hooks")]
pub fn reset_validation_call_count() {
    VALIDATION_CALL_COUNT.store(0, Ordering::SeqCst);
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Template {0} requires engine >= {1}, current engine is {2}")]
    EngineVersionMismatch(String, String, String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Render failed: {0}")]
    Render(#[from] RenderError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A card number paired with what its QR code encodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCard {
    pub card_number: u32,
    pub tracking_url: String,
}

#[derive(Debug, Clone)]
pub struct PrintRequest {
    pub count: u32,
    pub ledger_path: PathBuf,
    pub output_dir: PathBuf,
    /// Where QR temp files go. Defaults to the system temp dir.
    pub scratch_dir: Option<PathBuf>,
    pub timestamp: DateTime<Local>,
}

impl PrintRequest {
    pub fn new(count: u32, ledger_path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            count,
            ledger_path: ledger_path.into(),
            output_dir: output_dir.into(),
            scratch_dir: None,
            timestamp: Local::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintRun {
    pub id: String,
    pub template_name: String,
    pub template_version: String,
    pub engine_version: String,
    pub created_at: DateTime<Local>,
    pub pdf_path: PathBuf,
    pub pdf_sha256: String,
    pub pages: usize,
    pub font: ActiveFont,
    pub first_card: u32,
    pub last_card: u32,
    pub records: Vec<LedgerRecord>,
    pub job_hash: String,
    pub manifest_hash: String,
}

/// Slot rectangles a dry run would fill on one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedPage {
    pub page: usize,
    pub slots: Vec<CardRect>,
    pub break_after: bool,
}

pub struct PrintPipeline {
    template: CardTemplate,
    validator: Validator,
}

impl PrintPipeline {
    pub fn new(template: CardTemplate) -> Self {
        Self {
            template,
            validator: Validator::new(),
        }
    }

    pub fn template(&self) -> &CardTemplate {
        &self.template
    }

    /// The only validation entry point.
    pub fn validate(&self) -> ValidationResult {
        #[cfg(feature = "test-hooks")]
        VALIDATION_CALL_COUNT.fetch_add(1, Ordering::SeqCst);

        self.validator.validate(&self.template)
    }

    /// Page and slot assignment for `count` cards, without touching any file.
    pub fn plan(&self, count: usize) -> Vec<PlannedPage> {
        let anchors = self.template.sheet.slot_anchors();
        paginate(count, anchors.len())
            .into_iter()
            .map(|page| PlannedPage {
                page: page.index + 1,
                slots: anchors[..page.cards.len()].to_vec(),
                break_after: page.break_after,
            })
            .collect()
    }

    /// Selects the embedded font if one is configured and loads, otherwise the
    /// fallback face. Returns the font in use and the metrics to lay out with,
    /// which are always those of the font actually drawn.
    pub fn select_font<C: Canvas>(
        &self,
        canvas: &mut C,
    ) -> Result<(ActiveFont, Cow<'static, FontMetrics>), RenderError> {
        let choice = &self.template.font;
        if let Some(path) = &choice.path {
            match canvas.try_register_font(path) {
                Ok(metrics) => {
                    info!(font = %path.display(), "Embedded font");
                    return Ok((ActiveFont::Embedded { path: path.clone() }, Cow::Owned(metrics)));
                }
                Err(e) => {
                    warn!(error = %e, fallback = ?choice.fallback, "Falling back to builtin font");
                }
            }
        }
        canvas.use_builtin_font(choice.fallback)?;
        Ok((
            ActiveFont::Builtin { face: choice.fallback },
            Cow::Borrowed(choice.fallback.metrics()),
        ))
    }

    /// Draws every card, breaking pages between full sheets only.
    pub fn render_cards<C: Canvas>(
        &self,
        canvas: &mut C,
        cards: &[IssuedCard],
        metrics: &FontMetrics,
        scratch_dir: &Path,
    ) -> Result<Vec<PagePlan>, RenderError> {
        let anchors = self.template.sheet.slot_anchors();
        let pages = paginate(cards.len(), anchors.len());

        for page in &pages {
            for (slot, &card_idx) in page.cards.iter().enumerate() {
                let card = &cards[card_idx];
                let ops = compose_card(&self.template, anchors[slot], metrics, &card.tracking_url);
                execute_ops(canvas, &ops, scratch_dir)?;
            }
            info!(page = page.index + 1, cards = page.cards.len(), "Rendered page");
            if page.break_after {
                canvas.show_page();
            }
        }
        Ok(pages)
    }

    /// Validate, allocate, render, persist the PDF, then commit the ledger.
    pub fn print(&self, request: &PrintRequest) -> Result<PrintRun, PipelineError> {
        self.check_engine_version()?;

        let validation = self.validate();
        if !validation.valid {
            let messages: Vec<_> = validation
                .violations
                .iter()
                .map(|v| format!("{}: {}", v.rule, v.message))
                .collect();
            return Err(PipelineError::ValidationFailed(messages.join("; ")));
        }

        let mut ledger = Ledger::open(&request.ledger_path)?;
        let allocation = ledger.allocate(request.count)?;
        let cards = self.issue(&allocation);
        info!(
            first = allocation.first,
            last = allocation.last,
            "Issuing cards"
        );

        let content = &self.template.content;
        let mut canvas = PdfCanvas::new(
            &self.template.sheet,
            &DocumentInfo {
                title: format!("{} - {} Business Cards", content.name, content.title),
                author: content.name.clone(),
                subject: format!("Business Cards for {}", content.name),
            },
        );
        let (font, metrics) = self.select_font(&mut canvas)?;
        let scratch = request
            .scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        self.render_cards(&mut canvas, &cards, &metrics, &scratch)?;

        let rendered = canvas.finish(&request.output_dir)?;
        let pdf_sha256 = sha256_hex(&rendered.bytes()?);
        let pages = rendered.pages();
        let pdf_path = rendered.persist(&request.output_dir.join(self.pdf_file_name(request)))?;

        let records = match ledger.commit(&allocation, &content.name, |n| {
            self.template.tracking_url(n)
        }) {
            Ok(records) => records,
            Err(e) => {
                if let Err(rm) = fs::remove_file(&pdf_path) {
                    warn!(path = %pdf_path.display(), error = %rm, "Could not remove orphaned PDF");
                }
                return Err(e.into());
            }
        };
        info!(pdf = %pdf_path.display(), pages, "Print run complete");

        let mut run = PrintRun {
            id: Uuid::new_v4().to_string(),
            template_name: self.template.name.clone(),
            template_version: self.template.version.clone(),
            engine_version: ENGINE_VERSION.to_string(),
            created_at: request.timestamp,
            pdf_path,
            pdf_sha256,
            pages,
            font,
            first_card: allocation.first,
            last_card: allocation.last,
            records,
            job_hash: compute_job_hash(&self.template, &allocation, ENGINE_VERSION)?,
            manifest_hash: String::new(),
        };
        run.manifest_hash = compute_manifest_hash(&run)?;
        Ok(run)
    }

    pub fn issue(&self, allocation: &Allocation) -> Vec<IssuedCard> {
        allocation
            .numbers()
            .map(|card_number| IssuedCard {
                card_number,
                tracking_url: self.template.tracking_url(card_number),
            })
            .collect()
    }

    fn check_engine_version(&self) -> Result<(), PipelineError> {
        let template = &self.template;
        let engine_ver = semver::Version::parse(ENGINE_VERSION)
            .map_err(|_| PipelineError::ValidationFailed("Invalid engine version".into()))?;
        let min_ver = semver::Version::parse(&template.engine_min_version).map_err(|_| {
            PipelineError::ValidationFailed("Invalid template engineMinVersion".into())
        })?;

        if engine_ver < min_ver {
            return Err(PipelineError::EngineVersionMismatch(
                template.version.clone(),
                template.engine_min_version.clone(),
                ENGINE_VERSION.to_string(),
            ));
        }
        Ok(())
    }

    fn pdf_file_name(&self, request: &PrintRequest) -> String {
        format!(
            "{}_{}.pdf",
            self.template.output_prefix,
            request.timestamp.format("%Y%m%d_%H%M%S")
        )
    }
}

fn execute_ops<C: Canvas>(
    canvas: &mut C,
    ops: &[DrawOp],
    scratch_dir: &Path,
) -> Result<(), RenderError> {
    for op in ops {
        match op {
            DrawOp::StrokeRect { rect, color, line_width } => {
                canvas.stroke_rect(*rect, *color, *line_width);
            }
            DrawOp::Text { text, x, y, size, color } => {
                canvas.draw_text(text, *x, *y, *size, *color)?;
            }
            DrawOp::QrCode { payload, x, y, size } => {
                // Dropped at the end of this arm, removing the file even on error.
                let qr = QrImage::create(payload, scratch_dir)?;
                canvas.draw_image(qr.path(), *x, *y, *size)?;
            }
        }
    }
    Ok(())
}

impl Default for PrintPipeline {
    fn default() -> Self {
        Self::new(CardTemplate::default())
    }
}
