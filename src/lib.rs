//! CardPress Core - Tracked Business Card Sheets
//!
//! # Guarantees
//! 1. Card numbers continue from the ledger and are never reused
//! 2. The ledger is appended only after the PDF exists under its final name
//! 3. Printing always validates the template first
//! 4. Layout is a pure function of the template
//! 5. QR temp files never outlive the card they were drawn on

pub mod templates;
pub mod validation;
pub mod hashing;
pub mod metrics;
pub mod layout;
pub mod ledger;
pub mod qr;
pub mod print;
pub mod pipeline;

pub use templates::{CardTemplate, CardContent, CardStyle, SheetSpec, FontSpec, CardColor, TextStyle};
pub use validation::{ValidationResult, ValidationRule, ValidationViolation, ViolationSeverity};
pub use hashing::{compute_manifest_hash, compute_job_hash, canonical_json};
pub use metrics::{BuiltinFace, FontMetrics, MetricsSource};
pub use layout::{CardRect, DrawOp, PagePlan, TextLine, compose_card, paginate, wrap_text, wrap_text_centered};
pub use ledger::{Allocation, Ledger, LedgerError, LedgerRecord};
pub use print::{ActiveFont, Canvas, FontUnavailable, PdfCanvas, RenderError};
pub use pipeline::{IssuedCard, PipelineError, PrintPipeline, PrintRequest, PrintRun};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const MIN_TEMPLATE_VERSION: &str = "1.0.0";
