//! Layout Engine - Card Grid and Text Wrapping
//!
//! Pure geometry. Coordinates are PDF user space in points: origin at the
//! bottom-left page corner, y grows upward. A card's anchor is its
//! bottom-left corner.

use serde::{Deserialize, Serialize};

use crate::metrics::FontMetrics;
use crate::templates::{CardColor, CardTemplate, SheetSpec, TextStyle};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CardRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl SheetSpec {
    pub fn slots_per_page(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    /// Width of the whole grid including inter-card spacing.
    pub fn grid_width(&self) -> f64 {
        let cols = f64::from(self.columns);
        cols * self.card_width + (cols - 1.0).max(0.0) * self.spacing
    }

    pub fn grid_height(&self) -> f64 {
        let rows = f64::from(self.rows);
        rows * self.card_height + (rows - 1.0).max(0.0) * self.spacing
    }

    /// Horizontal margin that centers the grid on the page.
    pub fn left_margin(&self) -> f64 {
        (self.page_width - self.grid_width()) / 2.0
    }

    /// Card rectangles for one page in reading order: left to right, top to bottom.
    pub fn slot_anchors(&self) -> Vec<CardRect> {
        let left = self.left_margin();
        let top_row_y = self.page_height - self.top_margin - self.card_height;

        let mut slots = Vec::with_capacity(self.slots_per_page());
        for row in 0..self.rows {
            let y = top_row_y - f64::from(row) * (self.card_height + self.spacing);
            for col in 0..self.columns {
                slots.push(CardRect {
                    x: left + f64::from(col) * (self.card_width + self.spacing),
                    y,
                    width: self.card_width,
                    height: self.card_height,
                });
            }
        }
        slots
    }
}

/// One page worth of cards. `cards` holds indices into the caller's card list;
/// card `cards[i]` occupies slot `i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagePlan {
    pub index: usize,
    pub cards: Vec<usize>,
    pub break_after: bool,
}

/// Groups `count` cards into pages of `slots_per_page`. Only the last page may be
/// partially filled, and no break follows it.
pub fn paginate(count: usize, slots_per_page: usize) -> Vec<PagePlan> {
    if count == 0 || slots_per_page == 0 {
        return vec![];
    }
    let page_count = count.div_ceil(slots_per_page);
    (0..page_count)
        .map(|index| {
            let start = index * slots_per_page;
            let end = (start + slots_per_page).min(count);
            PagePlan {
                index,
                cards: (start..end).collect(),
                break_after: index + 1 < page_count,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    pub width: f64,
}

/// Greedy word wrap. Each word is charged its own width plus one trailing space,
/// and a line never accumulates more than `width`. A word that alone exceeds
/// `width` is emitted on a line of its own, unbroken.
pub fn wrap_text(text: &str, width: f64, metrics: &FontMetrics, size: f64) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_width = 0.0;

    for word in text.split_whitespace() {
        let word_width = metrics.measure(word, size) + metrics.measure(" ", size);
        if current.is_empty() || current_width + word_width <= width {
            current.push(word);
            current_width += word_width;
        } else {
            lines.push(current.join(" "));
            current = vec![word];
            current_width = word_width;
        }
    }
    if !current.is_empty() {
        lines.push(current.join(" "));
    }
    lines
}

/// `wrap_text` plus each line's measured width, for horizontal centering.
pub fn wrap_text_centered(
    text: &str,
    width: f64,
    metrics: &FontMetrics,
    size: f64,
) -> Vec<TextLine> {
    wrap_text(text, width, metrics, size)
        .into_iter()
        .map(|line| {
            let width = metrics.measure(&line, size);
            TextLine { text: line, width }
        })
        .collect()
}

/// A single drawing instruction for a rendering surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawOp {
    StrokeRect {
        rect: CardRect,
        color: CardColor,
        line_width: f64,
    },
    /// `y` is the text baseline.
    Text {
        text: String,
        x: f64,
        y: f64,
        size: f64,
        color: CardColor,
    },
    QrCode {
        payload: String,
        x: f64,
        y: f64,
        size: f64,
    },
}

/// Lays out one card inside `rect`.
///
/// Stack from the top: name, title, description, services. The QR code sits
/// in the bottom-right corner; contact and address lines sit bottom-left,
/// aligned to the top of the QR code.
pub fn compose_card(
    template: &CardTemplate,
    rect: CardRect,
    metrics: &FontMetrics,
    tracking_url: &str,
) -> Vec<DrawOp> {
    let style = &template.style;
    let content = &template.content;
    let margin = style.inner_margin;
    let text_x = rect.x + margin;
    let text_width = rect.width - 2.0 * margin;
    let mut cursor = rect.y + rect.height - margin;

    let mut ops = vec![DrawOp::StrokeRect {
        rect,
        color: style.accent,
        line_width: style.border_width,
    }];

    let name_width = metrics.measure(&content.name, style.name.size);
    ops.push(DrawOp::Text {
        text: content.name.clone(),
        x: text_x + (text_width - name_width) / 2.0,
        y: cursor - style.name.size,
        size: style.name.size,
        color: style.accent,
    });
    cursor -= style.name.leading;

    let mut centered = |ops: &mut Vec<DrawOp>, text: &str, ts: TextStyle, color: CardColor| {
        for line in wrap_text_centered(text, text_width, metrics, ts.size) {
            ops.push(DrawOp::Text {
                x: text_x + (text_width - line.width) / 2.0,
                y: cursor - ts.size,
                text: line.text,
                size: ts.size,
                color,
            });
            cursor -= ts.leading;
        }
    };
    centered(&mut ops, &content.title, style.title, style.accent);
    centered(&mut ops, &content.description, style.description, style.text);

    let services = format!("{}{}", content.services_label, content.services);
    for line in wrap_text(&services, text_width, metrics, style.services.size) {
        ops.push(DrawOp::Text {
            text: line,
            x: text_x,
            y: cursor - style.services.size,
            size: style.services.size,
            color: style.text,
        });
        cursor -= style.services.leading;
    }

    let bottom_y = rect.y + margin;
    ops.push(DrawOp::QrCode {
        payload: tracking_url.to_string(),
        x: rect.x + rect.width - margin - style.qr_size,
        y: bottom_y,
        size: style.qr_size,
    });

    let contact_y = bottom_y + style.qr_size - style.footer.leading;
    for (i, line) in [&content.contact, &content.address].into_iter().enumerate() {
        ops.push(DrawOp::Text {
            text: line.clone(),
            x: text_x,
            y: contact_y - i as f64 * style.footer.leading,
            size: style.footer.size,
            color: style.text,
        });
    }

    ops
}
