//! Validation System - Rule/Policy Separation
//!
//! Rules inspect a template and produce structured violations.
//! Any `Error` violation blocks printing; warnings are reported only.

use serde::{Deserialize, Serialize};

use crate::templates::CardTemplate;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationViolation {
    pub rule: String,
    pub severity: ViolationSeverity,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub remediation: Vec<String>,
}

impl ValidationViolation {
    fn error(rule: &str, message: impl Into<String>) -> Self {
        Self {
            rule: rule.to_string(),
            severity: ViolationSeverity::Error,
            message: message.into(),
            expected: None,
            actual: None,
            remediation: vec![],
        }
    }

    fn expected(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }

    fn remedy(mut self, hint: &str) -> Self {
        self.remediation.push(hint.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub violations: Vec<ValidationViolation>,
    pub template_name: String,
    pub template_version: String,
}

impl ValidationResult {
    pub fn has_errors(&self) -> bool {
        self.violations.iter().any(|v| v.severity == ViolationSeverity::Error)
    }
}

pub trait ValidationRule {
    fn name(&self) -> &'static str;
    fn validate(&self, template: &CardTemplate) -> Vec<ValidationViolation>;
}

// --- Concrete Rules ---

pub struct PositiveDimensionsRule;

impl ValidationRule for PositiveDimensionsRule {
    fn name(&self) -> &'static str { "positive_dimensions" }

    fn validate(&self, template: &CardTemplate) -> Vec<ValidationViolation> {
        let sheet = &template.sheet;
        let style = &template.style;
        let mut violations = vec![];

        let lengths = [
            ("pageWidth", sheet.page_width),
            ("pageHeight", sheet.page_height),
            ("cardWidth", sheet.card_width),
            ("cardHeight", sheet.card_height),
            ("qrSize", style.qr_size),
            ("name.size", style.name.size),
            ("title.size", style.title.size),
            ("description.size", style.description.size),
            ("services.size", style.services.size),
            ("footer.size", style.footer.size),
        ];
        for (field, value) in lengths {
            if !(value.is_finite() && value > 0.0) {
                violations.push(
                    ValidationViolation::error(self.name(), format!("{field} must be positive"))
                        .expected("> 0", value.to_string()),
                );
            }
        }

        let offsets = [
            ("topMargin", sheet.top_margin),
            ("spacing", sheet.spacing),
            ("innerMargin", style.inner_margin),
            ("borderWidth", style.border_width),
        ];
        for (field, value) in offsets {
            if !(value.is_finite() && value >= 0.0) {
                violations.push(
                    ValidationViolation::error(self.name(), format!("{field} must not be negative"))
                        .expected(">= 0", value.to_string()),
                );
            }
        }

        if sheet.columns == 0 || sheet.rows == 0 {
            violations.push(
                ValidationViolation::error(self.name(), "Grid needs at least one slot")
                    .expected(">= 1 x 1", format!("{} x {}", sheet.columns, sheet.rows)),
            );
        }
        violations
    }
}

pub struct GridFitsPageRule;

impl ValidationRule for GridFitsPageRule {
    fn name(&self) -> &'static str { "grid_fits_page" }

    fn validate(&self, template: &CardTemplate) -> Vec<ValidationViolation> {
        let sheet = &template.sheet;
        let mut violations = vec![];

        if sheet.grid_width() > sheet.page_width {
            violations.push(
                ValidationViolation::error(self.name(), "Card columns wider than the page")
                    .expected(
                        format!("<= {:.1}pt", sheet.page_width),
                        format!("{:.1}pt", sheet.grid_width()),
                    )
                    .remedy("Reduce columns, card width, or spacing"),
            );
        }
        let needed = sheet.top_margin + sheet.grid_height();
        if needed > sheet.page_height {
            violations.push(
                ValidationViolation::error(self.name(), "Card rows taller than the page")
                    .expected(format!("<= {:.1}pt", sheet.page_height), format!("{needed:.1}pt"))
                    .remedy("Reduce rows, card height, spacing, or top margin"),
            );
        }
        violations
    }
}

pub struct QrFitsCardRule;

impl ValidationRule for QrFitsCardRule {
    fn name(&self) -> &'static str { "qr_fits_card" }

    fn validate(&self, template: &CardTemplate) -> Vec<ValidationViolation> {
        let inner = |edge: f64| edge - 2.0 * template.style.inner_margin;
        let room = inner(template.sheet.card_width).min(inner(template.sheet.card_height));
        if template.style.qr_size > room {
            vec![ValidationViolation::error(self.name(), "QR code does not fit inside the card")
                .expected(format!("<= {room:.1}pt"), format!("{:.1}pt", template.style.qr_size))
                .remedy("Shrink qrSize or innerMargin")]
        } else {
            vec![]
        }
    }
}

pub struct TrackingUrlRule;

impl ValidationRule for TrackingUrlRule {
    fn name(&self) -> &'static str { "tracking_url" }

    fn validate(&self, template: &CardTemplate) -> Vec<ValidationViolation> {
        let base = template.base_url.trim();
        if base.is_empty() {
            return vec![ValidationViolation::error(self.name(), "Base URL is empty")
                .remedy("Set baseUrl, e.g. https://example.com/card?id=")];
        }
        if !(base.starts_with("https://") || base.starts_with("http://")) {
            return vec![ValidationViolation {
                severity: ViolationSeverity::Warning,
                ..ValidationViolation::error(self.name(), "Base URL is not an http(s) URL")
                    .expected("http(s)://...", base)
            }];
        }
        vec![]
    }
}

pub struct EngineVersionRule;

impl ValidationRule for EngineVersionRule {
    fn name(&self) -> &'static str { "engine_version" }

    fn validate(&self, template: &CardTemplate) -> Vec<ValidationViolation> {
        let min = match semver::Version::parse(&template.engine_min_version) {
            Ok(v) => v,
            Err(e) => {
                return vec![ValidationViolation::error(self.name(), "Invalid engineMinVersion")
                    .expected("semver", format!("{} ({e})", template.engine_min_version))];
            }
        };
        match semver::Version::parse(crate::ENGINE_VERSION) {
            Ok(engine) if engine >= min => vec![],
            Ok(engine) => vec![ValidationViolation::error(
                self.name(),
                "Template requires a newer engine",
            )
            .expected(format!(">= {min}"), engine.to_string())],
            Err(_) => vec![ValidationViolation::error(self.name(), "Invalid engine version")],
        }
    }
}

pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(PositiveDimensionsRule),
                Box::new(GridFitsPageRule),
                Box::new(QrFitsCardRule),
                Box::new(TrackingUrlRule),
                Box::new(EngineVersionRule),
            ],
        }
    }

    pub fn validate(&self, template: &CardTemplate) -> ValidationResult {
        let violations: Vec<_> = self
            .rules
            .iter()
            .flat_map(|rule| rule.validate(template))
            .collect();

        ValidationResult {
            valid: !violations.iter().any(|v| v.severity == ViolationSeverity::Error),
            violations,
            template_name: template.name.clone(),
            template_version: template.version.clone(),
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::SheetSpec;

    fn rules_hit(template: &CardTemplate) -> Vec<String> {
        Validator::new()
            .validate(template)
            .violations
            .into_iter()
            .map(|v| v.rule)
            .collect()
    }

    #[test]
    fn test_default_template_valid() {
        let result = Validator::new().validate(&CardTemplate::default());
        assert!(result.valid, "{:?}", result.violations);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn test_three_columns_overflow_letter() {
        let mut template = CardTemplate::default();
        template.sheet.columns = 3;
        let result = Validator::new().validate(&template);
        assert!(!result.valid);
        assert_eq!(rules_hit(&template), vec!["grid_fits_page"]);
    }

    #[test]
    fn test_too_many_rows() {
        let template = CardTemplate {
            sheet: SheetSpec { rows: 6, ..SheetSpec::default() },
            ..CardTemplate::default()
        };
        assert!(rules_hit(&template).contains(&"grid_fits_page".to_string()));
    }

    #[test]
    fn test_zero_grid_rejected() {
        let mut template = CardTemplate::default();
        template.sheet.rows = 0;
        assert!(rules_hit(&template).contains(&"positive_dimensions".to_string()));
    }

    #[test]
    fn test_oversized_qr() {
        let mut template = CardTemplate::default();
        template.style.qr_size = 140.0;
        assert_eq!(rules_hit(&template), vec!["qr_fits_card"]);
    }

    #[test]
    fn test_non_http_base_url_only_warns() {
        let mut template = CardTemplate::default();
        template.base_url = "card:".to_string();
        let result = Validator::new().validate(&template);
        assert!(result.valid);
        assert_eq!(result.violations[0].severity, ViolationSeverity::Warning);
    }

    #[test]
    fn test_future_engine_requirement_blocks() {
        let mut template = CardTemplate::default();
        template.engine_min_version = "99.0.0".to_string();
        let result = Validator::new().validate(&template);
        assert!(result.has_errors());
        assert_eq!(result.violations[0].rule, "engine_version");
    }
}
