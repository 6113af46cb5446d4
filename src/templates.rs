//! Card Template System - Immutable Run Configuration
//!
//! Everything a run needs (content, style, sheet geometry, fonts) lives in
//! one `CardTemplate` passed down explicitly. No process-wide state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::metrics::BuiltinFace;

pub const POINTS_PER_INCH: f64 = 72.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardTemplate {
    pub name: String,
    pub version: String,
    #[serde(default = "default_engine_min")]
    pub engine_min_version: String,
    pub content: CardContent,
    #[serde(default)]
    pub style: CardStyle,
    #[serde(default)]
    pub sheet: SheetSpec,
    #[serde(default)]
    pub font: FontSpec,
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,
    pub base_url: String,
}

fn default_engine_min() -> String { crate::MIN_TEMPLATE_VERSION.to_string() }
fn default_output_prefix() -> String { "Business_Cards".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardContent {
    pub name: String,
    pub title: String,
    pub description: String,
    pub services: String,
    #[serde(default = "default_services_label")]
    pub services_label: String,
    pub contact: String,
    pub address: String,
}

fn default_services_label() -> String { "Services: ".to_string() }

/// Font size and baseline-to-baseline advance, both in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub size: f64,
    pub leading: f64,
}

impl TextStyle {
    pub const fn new(size: f64, leading: f64) -> Self {
        Self { size, leading }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardStyle {
    pub accent: CardColor,
    pub text: CardColor,
    /// Border stroke; thick enough to cut along.
    pub border_width: f64,
    pub inner_margin: f64,
    pub name: TextStyle,
    pub title: TextStyle,
    pub description: TextStyle,
    pub services: TextStyle,
    pub footer: TextStyle,
    pub qr_size: f64,
}

impl Default for CardStyle {
    fn default() -> Self {
        Self {
            accent: CardColor::new(0x00, 0x91, 0x8b),
            text: CardColor::BLACK,
            border_width: 2.0,
            inner_margin: 0.125 * POINTS_PER_INCH,
            name: TextStyle::new(12.0, 14.0),
            title: TextStyle::new(10.0, 12.0),
            description: TextStyle::new(8.0, 10.0),
            services: TextStyle::new(7.0, 9.0),
            footer: TextStyle::new(7.0, 10.0),
            qr_size: 1.0 * POINTS_PER_INCH,
        }
    }
}

/// Page and card grid geometry in points. Origin is the bottom-left page corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetSpec {
    pub page_width: f64,
    pub page_height: f64,
    pub card_width: f64,
    pub card_height: f64,
    pub columns: u32,
    pub rows: u32,
    pub top_margin: f64,
    #[serde(default)]
    pub spacing: f64,
}

impl Default for SheetSpec {
    /// US Letter, 3.5in x 2in cards, 2 x 5 grid.
    fn default() -> Self {
        Self {
            page_width: 8.5 * POINTS_PER_INCH,
            page_height: 11.0 * POINTS_PER_INCH,
            card_width: 3.5 * POINTS_PER_INCH,
            card_height: 2.0 * POINTS_PER_INCH,
            columns: 2,
            rows: 5,
            top_margin: 0.25 * POINTS_PER_INCH,
            spacing: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontSpec {
    /// TrueType font to embed, measured with its own advance widths. When
    /// `null` or unreadable the fallback face is used for drawing and measuring.
    #[serde(default = "default_font_path")]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub fallback: BuiltinFace,
}

/// Century Schoolbook as installed on Windows.
pub const DEFAULT_FONT_PATH: &str = "C:/Windows/Fonts/CENSCBK.TTF";

fn default_font_path() -> Option<PathBuf> { Some(PathBuf::from(DEFAULT_FONT_PATH)) }

impl Default for FontSpec {
    fn default() -> Self {
        Self {
            path: default_font_path(),
            fallback: BuiltinFace::Helvetica,
        }
    }
}

/// RGB color, serialized as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CardColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl CardColor {
    pub const BLACK: CardColor = CardColor { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Channels scaled to 0.0..=1.0.
    pub fn unit(&self) -> (f64, f64, f64) {
        (
            f64::from(self.r) / 255.0,
            f64::from(self.g) / 255.0,
            f64::from(self.b) / 255.0,
        )
    }
}

impl TryFrom<String> for CardColor {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let hex = value
            .strip_prefix('#')
            .ok_or_else(|| format!("color must start with '#': {value}"))?;
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("color must be #rrggbb: {value}"));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| format!("{value}: {e}"))
        };
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl From<CardColor> for String {
    fn from(color: CardColor) -> Self {
        color.to_string()
    }
}

impl fmt::Display for CardColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to read template {}: {}", .0.display(), .1)]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Invalid template {}: {}", .0.display(), .1)]
    Parse(PathBuf, #[source] serde_json::Error),
}

impl CardTemplate {
    pub fn load_from_file(path: &Path) -> Result<Self, TemplateError> {
        let content = fs::read_to_string(path)
            .map_err(|e| TemplateError::Read(path.to_path_buf(), e))?;
        serde_json::from_str(&content).map_err(|e| TemplateError::Parse(path.to_path_buf(), e))
    }

    /// Tracking URL encoded into a card's QR code. Numbers are padded to at least 3 digits.
    pub fn tracking_url(&self, card_number: u32) -> String {
        format!("{}{:03}", self.base_url, card_number)
    }
}

impl Default for CardTemplate {
    fn default() -> Self {
        Self {
            name: "tech-consigliere".to_string(),
            version: "1.0.0".to_string(),
            engine_min_version: default_engine_min(),
            content: CardContent {
                name: "Eric Zosso".to_string(),
                title: "Tech Consigliere for humble owners".to_string(),
                description: "helping you take care of (pretty much) any problem".to_string(),
                services: "Rewards Programs, AI integration, AI to organize all your files, \
                           easy liability waivers, bitcoin/crypto integration"
                    .to_string(),
                services_label: default_services_label(),
                contact: "(219) 241-3354  eric@zoseco.com".to_string(),
                address: "2175 S. Lafayette St, Denver, CO 80210".to_string(),
            },
            style: CardStyle::default(),
            sheet: SheetSpec::default(),
            font: FontSpec::default(),
            output_prefix: "Eric_Zosso_Business_Cards".to_string(),
            base_url: "https://zoseco.com/tech-consigliere?card=".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracking_url_zero_padded() {
        let template = CardTemplate::default();
        assert_eq!(
            template.tracking_url(7),
            "https://zoseco.com/tech-consigliere?card=007"
        );
        assert!(template.tracking_url(1234).ends_with("card=1234"));
    }

    #[test]
    fn test_color_round_trips_through_json() {
        let color: CardColor = serde_json::from_str(r##""#00918b""##).unwrap();
        assert_eq!(color, CardColor::new(0, 0x91, 0x8b));
        assert_eq!(serde_json::to_string(&color).unwrap(), r##""#00918b""##);
    }

    #[test]
    fn test_color_rejects_garbage() {
        assert!(serde_json::from_str::<CardColor>(r#""00918b""#).is_err());
        assert!(serde_json::from_str::<CardColor>(r##""#0091""##).is_err());
        assert!(serde_json::from_str::<CardColor>(r##""#zz918b""##).is_err());
    }

    #[test]
    fn test_minimal_template_fills_defaults() {
        let json = r#"{
            "name": "minimal",
            "version": "1.0.0",
            "baseUrl": "https://example.com/c?n=",
            "content": {
                "name": "A", "title": "B", "description": "C",
                "services": "D", "contact": "E", "address": "F"
            }
        }"#;
        let template: CardTemplate = serde_json::from_str(json).unwrap();
        assert_eq!(template.sheet, SheetSpec::default());
        assert_eq!(template.content.services_label, "Services: ");
        assert_eq!(template.font.fallback, BuiltinFace::Helvetica);
        assert_eq!(template.font.path, Some(PathBuf::from(DEFAULT_FONT_PATH)));
        assert_eq!(template.output_prefix, "Business_Cards");
    }

    #[test]
    fn test_null_font_path_disables_embedding() {
        let font: FontSpec = serde_json::from_str(r#"{ "path": null, "fallback": "courier" }"#).unwrap();
        assert_eq!(font.path, None);
        assert_eq!(font.fallback, BuiltinFace::Courier);
    }
}
