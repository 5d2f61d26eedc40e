//! Cell-level visual style: fill, font, border, alignment and number format.
//!
//! Coordinates are zero-based `(row, col)` in worksheet space, so row 0 is
//! the header and data row `i` lives at row `i + 1`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 24-bit RGB color (`0xRRGGBB`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub u32);

impl Rgb {
    pub const WHITE: Rgb = Rgb(0xFF_FF_FF);
    pub const HEADER_BLUE: Rgb = Rgb(0x44_72_C4);
    pub const SUBTOTAL_GRAY: Rgb = Rgb(0xE0_E0_E0);

    /// Parse `#RRGGBB`, `RRGGBB` or `AARRGGBB` (alpha is dropped)
    pub fn from_hex(text: &str) -> Option<Self> {
        let hex = text.trim().trim_start_matches('#');
        let hex = match hex.len() {
            6 => hex,
            8 => &hex[2..],
            _ => return None,
        };
        u32::from_str_radix(hex, 16).ok().map(Rgb)
    }

    pub fn to_hex(self) -> String {
        format!("#{:06X}", self.0)
    }
}

/// The named palette accepted in operation specs.
const PALETTE: &[(&str, u32)] = &[
    ("red", 0xFF0000),
    ("green", 0x00FF00),
    ("yellow", 0xFFFF00),
    ("blue", 0x0000FF),
    ("orange", 0xFFA500),
    ("purple", 0x800080),
    ("pink", 0xFFC0CB),
    ("cyan", 0x00FFFF),
    ("light_green", 0x90EE90),
    ("light_blue", 0xADD8E6),
    ("light_yellow", 0xFFFFE0),
    ("light_red", 0xFFCCCB),
    ("gray", 0xD3D3D3),
];

/// Resolve a palette name (case-insensitive, spaces allowed) or a hex literal.
pub fn parse_color(name: &str) -> Option<Rgb> {
    let key = name.trim().to_lowercase().replace([' ', '-'], "_");
    let key = if key == "grey" { "gray".to_string() } else { key };
    PALETTE
        .iter()
        .find(|(n, _)| *n == key)
        .map(|(_, rgb)| Rgb(*rgb))
        .or_else(|| Rgb::from_hex(name))
}

/// Solid pattern fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub color: Rgb,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Font {
    pub bold: bool,
    pub italic: bool,
    pub color: Option<Rgb>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BorderLine {
    #[default]
    None,
    Thin,
    Medium,
    Thick,
    Dashed,
    Dotted,
    Double,
}

impl BorderLine {
    /// Map an OOXML `style` attribute value
    pub fn from_ooxml(style: &str) -> Self {
        match style {
            "thin" | "hair" => BorderLine::Thin,
            "medium" => BorderLine::Medium,
            "thick" => BorderLine::Thick,
            "dashed" | "mediumDashed" | "dashDot" | "mediumDashDot" => BorderLine::Dashed,
            "dotted" => BorderLine::Dotted,
            "double" => BorderLine::Double,
            _ => BorderLine::None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Border {
    pub left: BorderLine,
    pub right: BorderLine,
    pub top: BorderLine,
    pub bottom: BorderLine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VAlign {
    Top,
    Center,
    Bottom,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alignment {
    pub horizontal: Option<HAlign>,
    pub vertical: Option<VAlign>,
    pub wrap: bool,
}

/// Everything the engine preserves about a cell besides its value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellStyle {
    pub fill: Option<Fill>,
    pub font: Font,
    pub border: Border,
    pub alignment: Alignment,
    pub number_format: Option<String>,
}

impl CellStyle {
    pub fn is_default(&self) -> bool {
        *self == CellStyle::default()
    }

    pub fn with_fill(mut self, color: Rgb) -> Self {
        self.fill = Some(Fill { color });
        self
    }

    /// Default header look for sheets without a style base
    pub fn header() -> Self {
        CellStyle {
            fill: Some(Fill {
                color: Rgb::HEADER_BLUE,
            }),
            font: Font {
                bold: true,
                italic: false,
                color: Some(Rgb::WHITE),
            },
            alignment: Alignment {
                horizontal: Some(HAlign::Center),
                vertical: Some(VAlign::Center),
                wrap: false,
            },
            ..CellStyle::default()
        }
    }
}

/// Sparse per-cell style storage for one sheet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleMap {
    cells: BTreeMap<(u32, u16), CellStyle>,
}

impl StyleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, row: u32, col: u16) -> Option<&CellStyle> {
        self.cells.get(&(row, col))
    }

    pub fn set(&mut self, row: u32, col: u16, style: CellStyle) {
        if style.is_default() {
            self.cells.remove(&(row, col));
        } else {
            self.cells.insert((row, col), style);
        }
    }

    /// Overwrite only the fill of a cell, keeping font/border/alignment/format
    pub fn set_fill(&mut self, row: u32, col: u16, color: Rgb) {
        let style = self.cells.entry((row, col)).or_default();
        style.fill = Some(Fill { color });
    }

    pub fn fill_at(&self, row: u32, col: u16) -> Option<Rgb> {
        self.get(row, col).and_then(|s| s.fill).map(|f| f.color)
    }

    /// All styled cells of one row, ordered by column
    pub fn row(&self, row: u32) -> impl Iterator<Item = (u16, &CellStyle)> {
        self.cells
            .range((row, 0)..=(row, u16::MAX))
            .map(|((_, col), style)| (*col, style))
    }

    pub fn iter(&self) -> impl Iterator<Item = ((u32, u16), &CellStyle)> {
        self.cells.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
