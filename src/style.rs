//! Cell style descriptors and the styling rules of a ledger sheet.
//!
//! Styles are plain values. Copying a row's look onto another row clones the
//! descriptors; nothing is shared between cells.

use crate::schema::{COLUMN_COUNT, COL_NUMBER};
use crate::sheet::Sheet;

/// Row height used when the template row has none.
pub const DEFAULT_ROW_HEIGHT: f64 = 20.0;

/// Column width given to schema columns that have none.
pub const DEFAULT_COLUMN_WIDTH: f64 = 15.0;

const BLACK: Rgb = Rgb(0x000000);
const WHITE: Rgb = Rgb(0xFFFFFF);
const TOTALS_GREY: Rgb = Rgb(0xD9D9D9);

/// 24-bit RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u32);

impl Rgb {
    /// Parse `RRGGBB` or `AARRGGBB` hex, ignoring the alpha byte.
    pub fn from_hex(hex: &str) -> Option<Rgb> {
        let hex = hex.trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let rgb = match hex.len() {
            8 => &hex[2..],
            6 => hex,
            _ => return None,
        };
        u32::from_str_radix(rgb, 16).ok().map(Rgb)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FontStyle {
    pub name: Option<String>,
    pub size: Option<f64>,
    pub color: Option<Rgb>,
    pub bold: bool,
    pub italic: bool,
}

/// `patternType` of a cell fill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FillPattern {
    #[default]
    None,
    Solid,
    MediumGray,
    DarkGray,
    LightGray,
    DarkHorizontal,
    DarkVertical,
    DarkDown,
    DarkUp,
    DarkGrid,
    DarkTrellis,
    LightHorizontal,
    LightVertical,
    LightDown,
    LightUp,
    LightGrid,
    LightTrellis,
    Gray125,
    Gray0625,
}

const FILL_PATTERNS: [(FillPattern, &str); 19] = [
    (FillPattern::None, "none"),
    (FillPattern::Solid, "solid"),
    (FillPattern::MediumGray, "mediumGray"),
    (FillPattern::DarkGray, "darkGray"),
    (FillPattern::LightGray, "lightGray"),
    (FillPattern::DarkHorizontal, "darkHorizontal"),
    (FillPattern::DarkVertical, "darkVertical"),
    (FillPattern::DarkDown, "darkDown"),
    (FillPattern::DarkUp, "darkUp"),
    (FillPattern::DarkGrid, "darkGrid"),
    (FillPattern::DarkTrellis, "darkTrellis"),
    (FillPattern::LightHorizontal, "lightHorizontal"),
    (FillPattern::LightVertical, "lightVertical"),
    (FillPattern::LightDown, "lightDown"),
    (FillPattern::LightUp, "lightUp"),
    (FillPattern::LightGrid, "lightGrid"),
    (FillPattern::LightTrellis, "lightTrellis"),
    (FillPattern::Gray125, "gray125"),
    (FillPattern::Gray0625, "gray0625"),
];

impl FillPattern {
    /// Map an OOXML `patternType`; unknown names read as no fill.
    pub fn from_ooxml(s: &str) -> FillPattern {
        FILL_PATTERNS
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(pattern, _)| *pattern)
            .unwrap_or_default()
    }

    pub fn as_ooxml(self) -> &'static str {
        FILL_PATTERNS
            .iter()
            .find(|(pattern, _)| *pattern == self)
            .map(|(_, name)| *name)
            .unwrap_or("none")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillStyle {
    pub pattern: FillPattern,
    pub foreground: Option<Rgb>,
    pub background: Option<Rgb>,
}

impl FillStyle {
    pub fn solid(color: Rgb) -> Self {
        FillStyle {
            pattern: FillPattern::Solid,
            foreground: Some(color),
            background: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BorderLine {
    #[default]
    None,
    Hair,
    Thin,
    Medium,
    Thick,
    Double,
    Dashed,
    Dotted,
}

impl BorderLine {
    /// Map an OOXML `style` attribute value.
    pub fn from_ooxml(s: &str) -> BorderLine {
        match s {
            "hair" => BorderLine::Hair,
            "thin" => BorderLine::Thin,
            "medium" => BorderLine::Medium,
            "thick" => BorderLine::Thick,
            "double" => BorderLine::Double,
            "dashed" | "mediumDashed" | "dashDot" | "mediumDashDot" | "dashDotDot"
            | "mediumDashDotDot" | "slantDashDot" => BorderLine::Dashed,
            "dotted" => BorderLine::Dotted,
            _ => BorderLine::None,
        }
    }

    pub fn as_ooxml(self) -> Option<&'static str> {
        match self {
            BorderLine::None => None,
            BorderLine::Hair => Some("hair"),
            BorderLine::Thin => Some("thin"),
            BorderLine::Medium => Some("medium"),
            BorderLine::Thick => Some("thick"),
            BorderLine::Double => Some("double"),
            BorderLine::Dashed => Some("dashed"),
            BorderLine::Dotted => Some("dotted"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BorderSide {
    pub line: BorderLine,
    pub color: Option<Rgb>,
}

impl BorderSide {
    pub fn new(line: BorderLine) -> Self {
        BorderSide {
            line,
            color: Some(BLACK),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Border {
    pub left: BorderSide,
    pub right: BorderSide,
    pub top: BorderSide,
    pub bottom: BorderSide,
}

impl Border {
    /// Same line on all four sides.
    pub fn all(line: BorderLine) -> Self {
        let side = BorderSide::new(line);
        Border {
            left: side,
            right: side,
            top: side,
            bottom: side,
        }
    }

    pub fn is_empty(&self) -> bool {
        [self.left, self.right, self.top, self.bottom]
            .iter()
            .all(|side| side.line == BorderLine::None)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HorizontalAlign {
    #[default]
    General,
    Left,
    Center,
    Right,
    Fill,
    Justify,
    CenterAcross,
}

impl HorizontalAlign {
    pub fn as_ooxml(self) -> Option<&'static str> {
        match self {
            HorizontalAlign::General => None,
            HorizontalAlign::Left => Some("left"),
            HorizontalAlign::Center => Some("center"),
            HorizontalAlign::Right => Some("right"),
            HorizontalAlign::Fill => Some("fill"),
            HorizontalAlign::Justify => Some("justify"),
            HorizontalAlign::CenterAcross => Some("centerContinuous"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VerticalAlign {
    #[default]
    Bottom,
    Top,
    Center,
    Justify,
}

impl VerticalAlign {
    pub fn as_ooxml(self) -> Option<&'static str> {
        match self {
            VerticalAlign::Bottom => None,
            VerticalAlign::Top => Some("top"),
            VerticalAlign::Center => Some("center"),
            VerticalAlign::Justify => Some("justify"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlignmentStyle {
    pub horizontal: HorizontalAlign,
    pub vertical: VerticalAlign,
    pub wrap: bool,
}

impl AlignmentStyle {
    pub fn centered(wrap: bool) -> Self {
        AlignmentStyle {
            horizontal: HorizontalAlign::Center,
            vertical: VerticalAlign::Center,
            wrap,
        }
    }
}

/// Excel number format of a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumberFormat {
    /// One of Excel's built-in formats, by index (never 0, which is General).
    Builtin(u8),
    Custom(String),
}

/// Visual formatting of one cell.
///
/// `CellStyle::default()` is Excel's "General" look: nothing set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellStyle {
    pub font: FontStyle,
    pub fill: FillStyle,
    pub border: Border,
    pub alignment: AlignmentStyle,
    /// `None` means General.
    pub number_format: Option<NumberFormat>,
}

impl CellStyle {
    pub fn is_default(&self) -> bool {
        *self == CellStyle::default()
    }
}

/// Look of a data row for every column of the schema, plus its height.
#[derive(Debug, Clone, PartialEq)]
pub struct RowTemplate {
    pub styles: Vec<CellStyle>,
    pub height: f64,
}

impl RowTemplate {
    /// The look used when a sheet has no styled first data row.
    pub fn base() -> Self {
        RowTemplate {
            styles: vec![base_data_style(); COLUMN_COUNT as usize],
            height: DEFAULT_ROW_HEIGHT,
        }
    }

    /// Snapshot the styling of `row` in `sheet`.
    ///
    /// Cells without a style of their own take the row or column default;
    /// columns with neither fall back to the base data style. A row without a
    /// custom height gets [`DEFAULT_ROW_HEIGHT`]. Returns the base template
    /// when the row carries no styling at all.
    pub fn capture(sheet: &Sheet, row: u32) -> Self {
        let styled = (COL_NUMBER..=COLUMN_COUNT).any(|col| sheet.effective_style(row, col).is_some());
        if !styled {
            return RowTemplate::base();
        }

        let styles = (COL_NUMBER..=COLUMN_COUNT)
            .map(|col| {
                sheet
                    .effective_style(row, col)
                    .cloned()
                    .unwrap_or_else(base_data_style)
            })
            .collect();

        RowTemplate {
            styles,
            height: sheet.row_height(row).unwrap_or(DEFAULT_ROW_HEIGHT),
        }
    }

    /// Give `dest_row` this template's look, keeping the values already there.
    ///
    /// Also sets a default width on schema columns that have none.
    pub fn apply(&self, sheet: &mut Sheet, dest_row: u32) {
        sheet.set_row_height(dest_row, self.height);
        for (i, style) in self.styles.iter().enumerate() {
            let col = COL_NUMBER + i as u16;
            sheet.set_style(dest_row, col, style.clone());
            if sheet.column_width(col).is_none() {
                sheet.set_column_width(col, DEFAULT_COLUMN_WIDTH);
            }
        }
    }
}

/// Fallback data cell look: Calibri 11, centred wrap, white fill, thin borders.
pub fn base_data_style() -> CellStyle {
    CellStyle {
        font: FontStyle {
            name: Some("Calibri".to_string()),
            size: Some(11.0),
            color: Some(BLACK),
            bold: false,
            italic: false,
        },
        fill: FillStyle::solid(WHITE),
        border: Border::all(BorderLine::Thin),
        alignment: AlignmentStyle::centered(true),
        number_format: None,
    }
}

/// Held/not-held totals cell: grey fill, thin border, centred wrap.
pub fn totals_style() -> CellStyle {
    CellStyle {
        fill: FillStyle::solid(TOTALS_GREY),
        border: Border::all(BorderLine::Thin),
        alignment: AlignmentStyle::centered(true),
        ..CellStyle::default()
    }
}

/// Per-reason total cell: thin border, centred wrap, no fill.
pub fn reason_total_style() -> CellStyle {
    CellStyle {
        font: FontStyle {
            name: Some("Calibri".to_string()),
            size: Some(11.0),
            color: Some(BLACK),
            ..FontStyle::default()
        },
        border: Border::all(BorderLine::Thin),
        alignment: AlignmentStyle::centered(true),
        ..CellStyle::default()
    }
}

/// Style for column `col` of a signature row spanning `first..=last`.
///
/// Every cell gets a thick top and bottom; the ends close the box on the
/// left and right.
pub fn signature_style(col: u16, first: u16, last: u16) -> CellStyle {
    let thick = BorderSide::new(BorderLine::Thick);
    let mut border = Border {
        top: thick,
        bottom: thick,
        ..Border::default()
    };
    if col == first {
        border.left = thick;
    }
    if col == last {
        border.right = thick;
    }

    CellStyle {
        border,
        alignment: AlignmentStyle::centered(false),
        ..CellStyle::default()
    }
}
