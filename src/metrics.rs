//! Font Metrics - Width Tables
//!
//! Builtin widths are the standard PDF base-14 AFM advances in 1/1000 em,
//! covering ASCII 0x20 (space) through 0x7E (~). Index = (char as usize) - 32.
//! Embedded fonts carry their own advances, read from the TTF `hmtx` table in
//! font units. Characters a face has no width for measure as `average_width`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// PDF base-14 faces every viewer can render without embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuiltinFace {
    #[default]
    Helvetica,
    TimesRoman,
    Courier,
}

impl BuiltinFace {
    pub fn metrics(self) -> &'static FontMetrics {
        match self {
            BuiltinFace::Helvetica => &HELVETICA,
            BuiltinFace::TimesRoman => &TIMES_ROMAN,
            BuiltinFace::Courier => &COURIER,
        }
    }
}

/// Where a set of widths came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsSource {
    Builtin(BuiltinFace),
    Embedded,
}

#[derive(Clone)]
pub struct FontMetrics {
    pub source: MetricsSource,
    units_per_em: u16,
    widths: [u16; 95],
    /// Non-ASCII advances. Empty for builtin faces.
    extended: BTreeMap<char, u16>,
    pub average_width: u16,
}

impl FontMetrics {
    /// Reads advance widths for every Unicode code point a TrueType face maps.
    ///
    /// Unmapped characters fall back to the `.notdef` advance, which is what
    /// the PDF viewer draws for them.
    pub fn from_ttf(data: &[u8]) -> Result<Self, ttf_parser::FaceParsingError> {
        let face = ttf_parser::Face::parse(data, 0)?;
        let notdef = face.glyph_hor_advance(ttf_parser::GlyphId(0)).unwrap_or(0);
        let advance = |c: char| face.glyph_index(c).and_then(|g| face.glyph_hor_advance(g));

        let mut widths = [notdef; 95];
        for (slot, code) in widths.iter_mut().zip(32u8..=126) {
            if let Some(w) = advance(char::from(code)) {
                *slot = w;
            }
        }

        let mut extended = BTreeMap::new();
        if let Some(cmap) = face.tables().cmap {
            for subtable in cmap.subtables.into_iter().filter(|s| s.is_unicode()) {
                subtable.codepoints(|cp| {
                    if let Some(c) = char::from_u32(cp).filter(|c| !(' '..='~').contains(c)) {
                        if let Some(w) = advance(c) {
                            extended.insert(c, w);
                        }
                    }
                });
            }
        }

        Ok(Self {
            source: MetricsSource::Embedded,
            units_per_em: face.units_per_em(),
            widths,
            extended,
            average_width: notdef,
        })
    }

    pub fn units_per_em(&self) -> u16 {
        self.units_per_em
    }

    /// Advance of one character, in font units.
    pub fn advance(&self, c: char) -> u16 {
        let code = c as usize;
        if (32..=126).contains(&code) {
            self.widths[code - 32]
        } else {
            self.extended.get(&c).copied().unwrap_or(self.average_width)
        }
    }

    /// Rendered width of `text` at `size` points, in points.
    pub fn measure(&self, text: &str, size: f64) -> f64 {
        let units: u32 = text.chars().map(|c| u32::from(self.advance(c))).sum();
        f64::from(units) * size / f64::from(self.units_per_em)
    }
}

impl std::fmt::Debug for FontMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMetrics")
            .field("source", &self.source)
            .field("units_per_em", &self.units_per_em)
            .finish()
    }
}


static HELVETICA: FontMetrics = FontMetrics {
    source: MetricsSource::Builtin(BuiltinFace::Helvetica),
    units_per_em: 1000,
    extended: BTreeMap::new(),
    #[rustfmt::skip]
    widths: [
        // sp    !    "    #    $    %    &    '    (    )    *    +    ,    -    .    /
        278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
        // 0-9
        556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
        // :    ;    <    =    >    ?    @
        278, 278, 584, 584, 584, 556, 1015,
        // A-M
        667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833,
        // N-Z
        722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
        // [    \    ]    ^    _    `
        278, 278, 278, 469, 556, 333,
        // a-m
        556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833,
        // n-z
        556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500,
        // {    |    }    ~
        334, 260, 334, 584,
    ],
    average_width: 556,
};

static TIMES_ROMAN: FontMetrics = FontMetrics {
    source: MetricsSource::Builtin(BuiltinFace::TimesRoman),
    units_per_em: 1000,
    extended: BTreeMap::new(),
    #[rustfmt::skip]
    widths: [
        // sp    !    "    #    $    %    &    '    (    )    *    +    ,    -    .    /
        250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
        // 0-9
        500, 500, 500, 500, 500, 500, 500, 500, 500, 500,
        // :    ;    <    =    >    ?    @
        278, 278, 564, 564, 564, 444, 921,
        // A-M
        722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889,
        // N-Z
        722, 722, 556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611,
        // [    \    ]    ^    _    `
        333, 278, 333, 469, 500, 333,
        // a-m
        444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778,
        // n-z
        500, 500, 500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444,
        // {    |    }    ~
        480, 200, 480, 541,
    ],
    average_width: 500,
};

static COURIER: FontMetrics = FontMetrics {
    source: MetricsSource::Builtin(BuiltinFace::Courier),
    units_per_em: 1000,
    extended: BTreeMap::new(),
    widths: [600; 95],
    average_width: 600,
};
