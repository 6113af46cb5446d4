//! Contract Invariant Tests
//!
//! These tests verify the non-negotiable guarantees.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone};

use cardpress_core::{
    metrics::{BuiltinFace, FontMetrics, MetricsSource},
    print::{ActiveFont, Canvas, DocumentInfo, FontUnavailable, PdfCanvas, RenderError},
    templates::{CardColor, CardTemplate},
    layout::{compose_card, CardRect, DrawOp},
    pipeline::{IssuedCard, PipelineError, PrintPipeline, PrintRequest},
    ledger::{Allocation, Ledger},
};

#[derive(Debug, Clone, PartialEq)]
enum Recorded {
    Rect,
    Text(String),
    Image,
    PageBreak,
}

/// Canvas that records calls instead of drawing.
#[derive(Default)]
struct RecordingCanvas {
    calls: Vec<Recorded>,
    fail_images: bool,
    image_paths: Vec<PathBuf>,
    font: Option<String>,
}

impl Canvas for RecordingCanvas {
    fn try_register_font(&mut self, path: &Path) -> Result<FontMetrics, FontUnavailable> {
        Err(FontUnavailable {
            path: path.to_path_buf(),
            reason: "not installed".to_string(),
        })
    }

    fn use_builtin_font(&mut self, face: BuiltinFace) -> Result<(), RenderError> {
        self.font = Some(format!("{face:?}"));
        Ok(())
    }

    fn stroke_rect(&mut self, _rect: CardRect, _color: CardColor, _line_width: f64) {
        self.calls.push(Recorded::Rect);
    }

    fn draw_text(
        &mut self,
        text: &str,
        _x: f64,
        _y: f64,
        _size: f64,
        _color: CardColor,
    ) -> Result<(), RenderError> {
        self.calls.push(Recorded::Text(text.to_string()));
        Ok(())
    }

    fn draw_image(&mut self, path: &Path, _x: f64, _y: f64, _size: f64) -> Result<(), RenderError> {
        assert!(path.exists(), "QR file must exist while drawn");
        self.image_paths.push(path.to_path_buf());
        if self.fail_images {
            return Err(RenderError::Image {
                path: path.to_path_buf(),
                reason: "simulated failure".to_string(),
            });
        }
        self.calls.push(Recorded::Image);
        Ok(())
    }

    fn show_page(&mut self) {
        self.calls.push(Recorded::PageBreak);
    }
}

fn cards(first: u32, last: u32) -> Vec<IssuedCard> {
    let template = CardTemplate::default();
    (first..=last)
        .map(|n| IssuedCard {
            card_number: n,
            tracking_url: template.tracking_url(n),
        })
        .collect()
}

fn request(dir: &Path, count: u32, second: u32) -> PrintRequest {
    let scratch = dir.join("scratch");
    fs::create_dir_all(&scratch).unwrap();
    PrintRequest {
        count,
        ledger_path: dir.join("card_ledger.csv"),
        output_dir: dir.to_path_buf(),
        scratch_dir: Some(scratch),
        timestamp: Local.with_ymd_and_hms(2026, 3, 14, 9, 26, second).unwrap(),
    }
}

fn roboto() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fonts/RobotoMedium.ttf")
}

fn pdfs_in(dir: &Path) -> Vec<PathBuf> {
    let mut found: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|e| e == "pdf"))
        .collect();
    found.sort();
    found
}

#[test]
fn invariant_full_page_has_no_page_break() {
    let pipeline = PrintPipeline::default();
    let scratch = tempfile::tempdir().unwrap();
    let mut canvas = RecordingCanvas::default();
    let metrics = BuiltinFace::Helvetica.metrics();

    let pages = pipeline
        .render_cards(&mut canvas, &cards(1, 10), metrics, scratch.path())
        .unwrap();

    assert_eq!(pages.len(), 1);
    assert!(!canvas.calls.contains(&Recorded::PageBreak));
    assert_eq!(canvas.calls.iter().filter(|c| **c == Recorded::Rect).count(), 10);
}

#[test]
fn invariant_overflow_breaks_once() {
    let pipeline = PrintPipeline::default();
    let scratch = tempfile::tempdir().unwrap();
    let mut canvas = RecordingCanvas::default();
    let metrics = BuiltinFace::Helvetica.metrics();

    let pages = pipeline
        .render_cards(&mut canvas, &cards(1, 12), metrics, scratch.path())
        .unwrap();

    assert_eq!(pages.len(), 2);
    assert_eq!(pages[1].cards.len(), 2);
    let breaks: Vec<_> = canvas
        .calls
        .iter()
        .enumerate()
        .filter(|(_, c)| **c == Recorded::PageBreak)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(breaks.len(), 1);
    // Exactly 10 cards are drawn before the break.
    let rects_before = canvas.calls[..breaks[0]]
        .iter()
        .filter(|c| **c == Recorded::Rect)
        .count();
    assert_eq!(rects_before, 10);
    assert_ne!(canvas.calls.last(), Some(&Recorded::PageBreak));
}

#[test]
fn invariant_qr_files_cleaned_after_each_card() {
    let pipeline = PrintPipeline::default();
    let scratch = tempfile::tempdir().unwrap();
    let mut canvas = RecordingCanvas::default();

    pipeline
        .render_cards(&mut canvas, &cards(1, 3), BuiltinFace::Helvetica.metrics(), scratch.path())
        .unwrap();

    assert_eq!(canvas.image_paths.len(), 3);
    assert!(canvas.image_paths.iter().all(|p| !p.exists()));
    assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[test]
fn invariant_qr_files_cleaned_when_draw_fails() {
    let pipeline = PrintPipeline::default();
    let scratch = tempfile::tempdir().unwrap();
    let mut canvas = RecordingCanvas {
        fail_images: true,
        ..Default::default()
    };

    let result = pipeline.render_cards(
        &mut canvas,
        &cards(1, 2),
        BuiltinFace::Helvetica.metrics(),
        scratch.path(),
    );

    assert!(matches!(result, Err(RenderError::Image { .. })));
    assert_eq!(canvas.image_paths.len(), 1);
    assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[test]
fn invariant_missing_font_falls_back() {
    let mut template = CardTemplate::default();
    template.font.path = Some(PathBuf::from("/nonexistent/CENSCBK.TTF"));
    let pipeline = PrintPipeline::new(template);
    let mut canvas = RecordingCanvas::default();

    let (font, metrics) = pipeline.select_font(&mut canvas).unwrap();

    assert_eq!(font, ActiveFont::Builtin { face: BuiltinFace::Helvetica });
    assert_eq!(metrics.source, MetricsSource::Builtin(BuiltinFace::Helvetica));
    assert_eq!(canvas.font.as_deref(), Some("Helvetica"));
}

#[test]
fn invariant_pdf_canvas_falls_back_when_font_missing() {
    let dir = tempfile::tempdir().unwrap();
    let mut template = CardTemplate::default();
    template.font.path = Some(dir.path().join("CENSCBK.TTF"));

    let run = PrintPipeline::new(template).print(&request(dir.path(), 3, 20)).unwrap();

    assert_eq!(run.font, ActiveFont::Builtin { face: BuiltinFace::Helvetica });
    assert!(fs::read(&run.pdf_path).unwrap().starts_with(b"%PDF"));
    assert_eq!(run.records.len(), 3);
}

#[test]
fn invariant_pdf_canvas_rejects_file_that_is_not_a_font() {
    let dir = tempfile::tempdir().unwrap();
    let bogus = dir.path().join("bogus.ttf");
    fs::write(&bogus, b"definitely not a font").unwrap();
    let mut canvas = PdfCanvas::new(&CardTemplate::default().sheet, &DocumentInfo::default());

    let err = canvas.try_register_font(&bogus).unwrap_err();

    assert_eq!(err.path, bogus);
}

#[test]
fn invariant_embedded_font_lines_fit_their_width() {
    let dir = tempfile::tempdir().unwrap();
    let mut template = CardTemplate::default();
    template.font.path = Some(roboto());
    let pipeline = PrintPipeline::new(template.clone());

    let run = pipeline.print(&request(dir.path(), 1, 21)).unwrap();
    assert_eq!(run.font, ActiveFont::Embedded { path: roboto() });

    let mut canvas = PdfCanvas::new(&template.sheet, &DocumentInfo::default());
    let (_, metrics) = pipeline.select_font(&mut canvas).unwrap();
    assert_eq!(metrics.source, MetricsSource::Embedded);

    // Widths straight from the font file, independent of FontMetrics.
    let data = fs::read(roboto()).unwrap();
    let face = ttf_parser::Face::parse(&data, 0).unwrap();
    let real_width = |text: &str, size: f64| {
        let units: u32 = text
            .chars()
            .map(|c| {
                let glyph = face.glyph_index(c).unwrap_or(ttf_parser::GlyphId(0));
                u32::from(face.glyph_hor_advance(glyph).unwrap_or(0))
            })
            .sum();
        f64::from(units) * size / f64::from(face.units_per_em())
    };

    let rect = template.sheet.slot_anchors()[0];
    let margin = template.style.inner_margin;
    let budget = rect.width - 2.0 * margin;
    let content = &template.content;
    let ops = compose_card(&template, rect, &metrics, &template.tracking_url(1));

    let mut services_lines = 0;
    for op in &ops {
        let DrawOp::Text { text, x, size, .. } = op else { continue };
        if *text == content.contact || *text == content.address {
            continue;
        }
        let width = real_width(text, *size);
        assert!(width <= budget + 1e-9, "{text:?} is {width:.1}pt, budget {budget:.1}pt");
        if *text == content.name {
            let centered = rect.x + margin + (budget - width) / 2.0;
            assert!((x - centered).abs() < 1e-6, "name at {x}, centered at {centered}");
        }
        if *size == template.style.services.size {
            services_lines += 1;
        }
    }
    assert!(services_lines >= 2);
}

#[test]
fn invariant_newer_engine_requirement_blocks_print() {
    let dir = tempfile::tempdir().unwrap();
    let mut template = CardTemplate::default();
    template.engine_min_version = "99.0.0".to_string();

    let result = PrintPipeline::new(template).print(&request(dir.path(), 1, 22));

    assert!(matches!(result, Err(PipelineError::EngineVersionMismatch(..))));
    assert!(!dir.path().join("card_ledger.csv").exists());
    assert!(pdfs_in(dir.path()).is_empty());
}

#[test]
fn invariant_print_writes_pdf_and_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = PrintPipeline::default();

    let run = pipeline.print(&request(dir.path(), 12, 0)).unwrap();

    assert_eq!((run.first_card, run.last_card), (1, 12));
    assert_eq!(run.pages, 2);
    assert_eq!(run.records.len(), 12);
    assert!(run.pdf_path.ends_with("Eric_Zosso_Business_Cards_20260314_092600.pdf"));
    let bytes = fs::read(&run.pdf_path).unwrap();
    assert!(bytes.starts_with(b"%PDF"));
    assert_eq!(run.pdf_sha256, cardpress_core::hashing::sha256_hex(&bytes));
    assert!(!run.manifest_hash.is_empty());

    let ledger = fs::read_to_string(dir.path().join("card_ledger.csv")).unwrap();
    let mut lines = ledger.lines();
    assert_eq!(lines.next(), Some("Name, Card Number, QR Code URL"));
    assert_eq!(
        lines.next(),
        Some("Eric Zosso,1,https://zoseco.com/tech-consigliere?card=001")
    );
    assert_eq!(lines.count(), 11);
    assert_eq!(fs::read_dir(dir.path().join("scratch")).unwrap().count(), 0);
}

#[test]
fn invariant_runs_continue_numbering() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = PrintPipeline::default();

    let first = pipeline.print(&request(dir.path(), 10, 1)).unwrap();
    let second = pipeline.print(&request(dir.path(), 4, 2)).unwrap();

    assert_eq!((first.first_card, first.last_card), (1, 10));
    assert_eq!((second.first_card, second.last_card), (11, 14));
    assert_ne!(first.job_hash, second.job_hash);

    let ledger = Ledger::open(&dir.path().join("card_ledger.csv")).unwrap();
    let numbers: Vec<u32> = ledger.records().iter().map(|r| r.card_number).collect();
    assert_eq!(numbers, (1..=14).collect::<Vec<_>>());
    assert_eq!(ledger.allocate(1).unwrap(), Allocation { first: 15, last: 15 });
    assert_eq!(pdfs_in(dir.path()).len(), 2);
}

#[test]
fn invariant_failed_persist_does_not_burn_numbers() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = PrintPipeline::default();

    pipeline.print(&request(dir.path(), 2, 5)).unwrap();
    // Same timestamp, so the PDF name is taken.
    let result = pipeline.print(&request(dir.path(), 2, 5));

    assert!(matches!(result, Err(PipelineError::Render(_))));
    let ledger = Ledger::open(&dir.path().join("card_ledger.csv")).unwrap();
    assert_eq!(ledger.next_card_number().unwrap(), 3);
    assert_eq!(pdfs_in(dir.path()).len(), 1);
    let leftovers = fs::read_dir(dir.path())
        .unwrap()
        .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".partial"))
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn invariant_corrupt_ledger_aborts_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let body = "Name, Card Number, QR Code URL\nEric Zosso,1,u\nEric Zosso,,u\n";
    fs::write(dir.path().join("card_ledger.csv"), body).unwrap();

    let result = PrintPipeline::default().print(&request(dir.path(), 5, 7));

    let err = result.unwrap_err();
    assert!(err.to_string().contains("Corrupt ledger"), "{err}");
    assert!(pdfs_in(dir.path()).is_empty());
    assert_eq!(fs::read_to_string(dir.path().join("card_ledger.csv")).unwrap(), body);
}

#[test]
fn invariant_invalid_template_blocks_print() {
    let dir = tempfile::tempdir().unwrap();
    let mut template = CardTemplate::default();
    template.sheet.columns = 3;

    let result = PrintPipeline::new(template).print(&request(dir.path(), 1, 9));

    assert!(result.unwrap_err().to_string().contains("Validation failed"));
    assert!(!dir.path().join("card_ledger.csv").exists());
    assert!(pdfs_in(dir.path()).is_empty());
}

#[test]
fn invariant_plan_truncates_last_page() {
    let pages = PrintPipeline::default().plan(12);
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].slots.len(), 10);
    assert_eq!(pages[1].slots.len(), 2);
    assert!(pages[0].break_after && !pages[1].break_after);
    assert!((pages[0].slots[0].x - 54.0).abs() < 1e-9);
    assert!((pages[0].slots[1].x - 306.0).abs() < 1e-9);
}

#[cfg(feature = "test-hooks")]
#[test]
fn invariant_print_calls_validate() {
    use cardpress_core::pipeline::{get_validation_call_count, reset_validation_call_count};

    let dir = tempfile::tempdir().unwrap();
    reset_validation_call_count();
    PrintPipeline::default().print(&request(dir.path(), 1, 11)).unwrap();
    assert!(get_validation_call_count() >= 1);
}
