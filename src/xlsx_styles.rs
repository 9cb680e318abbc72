//! Formatting reader for xlsx packages.
//!
//! calamine only hands back cell values, so the style table in
//! `xl/styles.xml` and the per-cell style ids, row heights, column widths and
//! merged ranges of the worksheet XML are parsed here with quick-xml.

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::schema::parse_cell_name;
use crate::sheet::MergeRange;
use crate::style::{
    AlignmentStyle, Border, BorderLine, BorderSide, CellStyle, FillPattern, FillStyle, FontStyle,
    HorizontalAlign, NumberFormat, Rgb, VerticalAlign,
};

/// Worksheet path used when the workbook relationships cannot be resolved.
pub const DEFAULT_SHEET_PATH: &str = "xl/worksheets/sheet1.xml";

/// First id Excel hands out to custom number formats.
pub const FIRST_CUSTOM_NUM_FMT: u16 = 164;

/// Widest column range expanded from a single `<col>` element.
const MAX_STYLED_COLUMN: u16 = 256;

/// `cellXfs` index to resolved style, plus the sizes of the part lists new
/// formats get appended to.
#[derive(Debug, Default)]
pub struct StyleTable {
    styles: Vec<CellStyle>,
    pub font_count: usize,
    pub fill_count: usize,
    pub border_count: usize,
    /// Custom number formats by id.
    pub number_formats: HashMap<u16, String>,
}

impl StyleTable {
    pub fn get(&self, id: usize) -> Option<&CellStyle> {
        self.styles.get(id)
    }

    /// First `cellXfs` index that resolves to `style`.
    pub fn find(&self, style: &CellStyle) -> Option<usize> {
        self.styles.iter().position(|s| s == style)
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

/// Layout facts pulled out of one worksheet XML. Rows and columns are 1-based.
#[derive(Debug, Default)]
pub struct SheetFormatting {
    /// (row, col, cellXfs id) for every cell with a non-default style.
    pub cell_styles: Vec<(u32, u16, usize)>,
    /// Widths as stored in the file, padding included.
    pub column_widths: Vec<(u16, f64)>,
    pub row_heights: Vec<(u32, f64)>,
    /// (row, cellXfs id) for rows with `customFormat`.
    pub row_styles: Vec<(u32, usize)>,
    /// (col, cellXfs id) from `<col style>`.
    pub column_styles: Vec<(u16, usize)>,
    pub merges: Vec<MergeRange>,
}

fn attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
}

fn attr_parse<T: std::str::FromStr>(e: &BytesStart, key: &[u8]) -> Option<T> {
    attr(e, key).and_then(|v| v.parse().ok())
}

/// `<b/>` is on, `<b val="0"/>` is off.
fn attr_flag(e: &BytesStart, key: &[u8]) -> bool {
    !matches!(attr(e, key).as_deref(), Some("0") | Some("false"))
}

fn unescape_xml(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Legacy indexed palette; 64 and 65 are the system foreground/background.
fn indexed_color(idx: u8) -> Option<Rgb> {
    let rgb = match idx {
        0 | 8 | 64 => 0x000000,
        1 | 9 | 65 => 0xFFFFFF,
        2 | 10 => 0xFF0000,
        3 | 11 => 0x00FF00,
        4 | 12 | 39 => 0x0000FF,
        5 | 13 | 34 => 0xFFFF00,
        6 | 14 | 33 => 0xFF00FF,
        7 | 15 | 35 => 0x00FFFF,
        16 | 37 => 0x800000,
        17 => 0x008000,
        18 | 32 => 0x000080,
        19 => 0x808000,
        20 | 36 => 0x800080,
        21 | 38 => 0x008080,
        22 => 0xC0C0C0,
        23 => 0x808080,
        24 => 0x9999FF,
        25 => 0x993366,
        26 => 0xFFFFCC,
        27 | 41 => 0xCCFFFF,
        28 => 0x660066,
        29 => 0xFF8080,
        30 => 0x0066CC,
        31 => 0xCCCCFF,
        40 => 0x00CCFF,
        42 => 0xCCFFCC,
        43 => 0xFFFF99,
        44 => 0x99CCFF,
        45 => 0xFF99CC,
        46 => 0xCC99FF,
        47 => 0xFFCC99,
        48 => 0x3366FF,
        49 => 0x33CCCC,
        50 => 0x99CC00,
        51 => 0xFFCC00,
        52 => 0xFF9900,
        53 => 0xFF6600,
        54 => 0x666699,
        55 => 0x969696,
        56 => 0x003366,
        57 => 0x339966,
        58 => 0x003300,
        59 => 0x333300,
        60 => 0x993300,
        61 => 0x993333,
        62 => 0x333399,
        63 => 0x333333,
        _ => return None,
    };
    Some(Rgb(rgb))
}

/// Office default theme, without tint.
fn theme_color(idx: u8) -> Option<Rgb> {
    let rgb = match idx {
        0 => 0xFFFFFF,
        1 => 0x000000,
        2 => 0xEEECE1,
        3 => 0x1F497D,
        4 => 0x4F81BD,
        5 => 0xC0504D,
        6 => 0x9BBB59,
        7 => 0x8064A2,
        8 => 0x4BACC6,
        9 => 0xF79646,
        _ => return None,
    };
    Some(Rgb(rgb))
}

fn hue_to_channel(p: f64, q: f64, mut t: f64) -> f64 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

/// Lighten (`tint > 0`) or darken (`tint < 0`) a colour the way Excel does:
/// in HSL space, moving the luminance towards white or black.
fn apply_tint(color: Rgb, tint: f64) -> Rgb {
    let channel = |shift: u32| ((color.0 >> shift) & 0xFF) as f64 / 255.0;
    let (r, g, b) = (channel(16), channel(8), channel(0));
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let lum = (max + min) / 2.0;

    let (hue, sat) = if max == min {
        (0.0, 0.0)
    } else {
        let d = max - min;
        let sat = if lum > 0.5 { d / (2.0 - max - min) } else { d / (max + min) };
        let hue = if max == r {
            (g - b) / d + if g < b { 6.0 } else { 0.0 }
        } else if max == g {
            (b - r) / d + 2.0
        } else {
            (r - g) / d + 4.0
        };
        (hue / 6.0, sat)
    };

    let lum = if tint < 0.0 {
        lum * (1.0 + tint)
    } else {
        lum * (1.0 - tint) + tint
    };

    let (r, g, b) = if sat == 0.0 {
        (lum, lum, lum)
    } else {
        let q = if lum < 0.5 { lum * (1.0 + sat) } else { lum + sat - lum * sat };
        let p = 2.0 * lum - q;
        (
            hue_to_channel(p, q, hue + 1.0 / 3.0),
            hue_to_channel(p, q, hue),
            hue_to_channel(p, q, hue - 1.0 / 3.0),
        )
    };
    let byte = |v: f64| (v * 255.0).round().clamp(0.0, 255.0) as u32;
    Rgb(byte(r) << 16 | byte(g) << 8 | byte(b))
}

/// Colour of a `<color>`, `<fgColor>` or `<bgColor>` element.
/// `rgb` wins over `indexed`, which wins over `theme`; `tint` applies to all.
fn parse_color(e: &BytesStart) -> Option<Rgb> {
    let base = if let Some(hex) = attr(e, b"rgb") {
        Rgb::from_hex(&hex)
    } else if let Some(idx) = attr_parse::<u8>(e, b"indexed") {
        indexed_color(idx)
    } else {
        attr_parse::<u8>(e, b"theme").and_then(theme_color)
    }?;
    match attr_parse::<f64>(e, b"tint") {
        Some(tint) if tint != 0.0 => Some(apply_tint(base, tint)),
        _ => Some(base),
    }
}

fn parse_horizontal(s: &str) -> HorizontalAlign {
    match s {
        "left" => HorizontalAlign::Left,
        "center" => HorizontalAlign::Center,
        "right" => HorizontalAlign::Right,
        "fill" => HorizontalAlign::Fill,
        "justify" | "distributed" => HorizontalAlign::Justify,
        "centerContinuous" => HorizontalAlign::CenterAcross,
        _ => HorizontalAlign::General,
    }
}

fn parse_vertical(s: &str) -> VerticalAlign {
    match s {
        "top" => VerticalAlign::Top,
        "center" => VerticalAlign::Center,
        "justify" | "distributed" => VerticalAlign::Justify,
        _ => VerticalAlign::Bottom,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Outside,
    NumFmts,
    Fonts,
    Fills,
    Borders,
    CellXfs,
    /// cellStyleXfs, dxfs and anything else whose children must not be
    /// mistaken for cell formats.
    Ignored,
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Left,
    Right,
    Top,
    Bottom,
}

#[derive(Debug, Default)]
struct RawXf {
    num_fmt_id: u16,
    font_id: usize,
    fill_id: usize,
    border_id: usize,
    alignment: AlignmentStyle,
}

/// One-pass reader over `styles.xml`.
struct StylesParser {
    section: Section,
    num_fmts: HashMap<u16, String>,
    fonts: Vec<FontStyle>,
    fills: Vec<FillStyle>,
    borders: Vec<Border>,
    xfs: Vec<RawXf>,
    font: Option<FontStyle>,
    fill: Option<FillStyle>,
    border: Option<Border>,
    side: Option<Side>,
    xf: Option<RawXf>,
}

impl StylesParser {
    fn new() -> Self {
        StylesParser {
            section: Section::Outside,
            num_fmts: HashMap::new(),
            fonts: Vec::new(),
            fills: Vec::new(),
            borders: Vec::new(),
            xfs: Vec::new(),
            font: None,
            fill: None,
            border: None,
            side: None,
            xf: None,
        }
    }

    fn open(&mut self, e: &BytesStart) {
        let local = e.local_name();
        let name = local.as_ref();
        match (self.section, name) {
            (_, b"numFmts") => self.section = Section::NumFmts,
            (_, b"fonts") => self.section = Section::Fonts,
            (_, b"fills") => self.section = Section::Fills,
            (_, b"borders") => self.section = Section::Borders,
            (_, b"cellXfs") => self.section = Section::CellXfs,
            (_, b"cellStyleXfs") | (_, b"dxfs") | (_, b"cellStyles") | (_, b"colors")
            | (_, b"extLst") => self.section = Section::Ignored,

            (Section::NumFmts, b"numFmt") => {
                if let (Some(id), Some(code)) =
                    (attr_parse::<u16>(e, b"numFmtId"), attr(e, b"formatCode"))
                {
                    self.num_fmts.insert(id, unescape_xml(&code));
                }
            }

            (Section::Fonts, b"font") => self.font = Some(FontStyle::default()),
            (Section::Fonts, _) => {
                if let Some(font) = self.font.as_mut() {
                    match name {
                        b"b" => font.bold = attr_flag(e, b"val"),
                        b"i" => font.italic = attr_flag(e, b"val"),
                        b"sz" => font.size = attr_parse(e, b"val"),
                        b"name" => font.name = attr(e, b"val"),
                        b"color" => font.color = parse_color(e),
                        _ => {}
                    }
                }
            }

            (Section::Fills, b"fill") => self.fill = Some(FillStyle::default()),
            (Section::Fills, _) => {
                if let Some(fill) = self.fill.as_mut() {
                    match name {
                        b"patternFill" => {
                            fill.pattern = attr(e, b"patternType")
                                .map(|p| FillPattern::from_ooxml(&p))
                                .unwrap_or_default();
                        }
                        b"fgColor" => fill.foreground = parse_color(e),
                        // A solid fill shows only its foreground.
                        b"bgColor" if fill.pattern != FillPattern::Solid => {
                            fill.background = parse_color(e)
                        }
                        _ => {}
                    }
                }
            }

            (Section::Borders, b"border") => self.border = Some(Border::default()),
            (Section::Borders, b"left" | b"right" | b"top" | b"bottom") => {
                let side = match name {
                    b"left" => Side::Left,
                    b"right" => Side::Right,
                    b"top" => Side::Top,
                    _ => Side::Bottom,
                };
                let line = attr(e, b"style")
                    .map(|s| BorderLine::from_ooxml(&s))
                    .unwrap_or_default();
                if let Some(border) = self.border.as_mut() {
                    *border_side(border, side) = BorderSide { line, color: None };
                    self.side = Some(side);
                }
            }
            (Section::Borders, b"color") => {
                if let (Some(border), Some(side)) = (self.border.as_mut(), self.side) {
                    let entry = border_side(border, side);
                    if entry.line != BorderLine::None {
                        entry.color = parse_color(e);
                    }
                }
            }

            (Section::CellXfs, b"xf") => {
                self.xf = Some(RawXf {
                    num_fmt_id: attr_parse(e, b"numFmtId").unwrap_or(0),
                    font_id: attr_parse(e, b"fontId").unwrap_or(0),
                    fill_id: attr_parse(e, b"fillId").unwrap_or(0),
                    border_id: attr_parse(e, b"borderId").unwrap_or(0),
                    alignment: AlignmentStyle::default(),
                })
            }
            (Section::CellXfs, b"alignment") => {
                if let Some(xf) = self.xf.as_mut() {
                    xf.alignment = AlignmentStyle {
                        horizontal: attr(e, b"horizontal")
                            .map(|s| parse_horizontal(&s))
                            .unwrap_or_default(),
                        vertical: attr(e, b"vertical")
                            .map(|s| parse_vertical(&s))
                            .unwrap_or_default(),
                        wrap: attr(e, b"wrapText").is_some() && attr_flag(e, b"wrapText"),
                    };
                }
            }
            _ => {}
        }
    }

    fn close(&mut self, name: &[u8]) {
        match name {
            b"numFmts" | b"fonts" | b"fills" | b"borders" | b"cellXfs" | b"cellStyleXfs"
            | b"dxfs" | b"cellStyles" | b"colors" | b"extLst" => self.section = Section::Outside,
            b"font" => {
                if let Some(font) = self.font.take() {
                    self.fonts.push(font);
                }
            }
            b"fill" => {
                if let Some(fill) = self.fill.take() {
                    self.fills.push(fill);
                }
            }
            b"border" => {
                if let Some(border) = self.border.take() {
                    self.borders.push(border);
                }
            }
            b"left" | b"right" | b"top" | b"bottom" => self.side = None,
            b"xf" => {
                if let Some(xf) = self.xf.take() {
                    self.xfs.push(xf);
                }
            }
            _ => {}
        }
    }

    fn number_format(&self, id: u16) -> Option<NumberFormat> {
        if let Some(code) = self.num_fmts.get(&id) {
            return Some(NumberFormat::Custom(code.clone()));
        }
        match id {
            0 => None,
            id if id < FIRST_CUSTOM_NUM_FMT => Some(NumberFormat::Builtin(id as u8)),
            _ => None,
        }
    }

    fn finish(self) -> StyleTable {
        let styles = self
            .xfs
            .iter()
            .map(|xf| CellStyle {
                font: self.fonts.get(xf.font_id).cloned().unwrap_or_default(),
                fill: self.fills.get(xf.fill_id).copied().unwrap_or_default(),
                border: self.borders.get(xf.border_id).copied().unwrap_or_default(),
                alignment: xf.alignment,
                number_format: self.number_format(xf.num_fmt_id),
            })
            .collect();
        StyleTable {
            styles,
            font_count: self.fonts.len(),
            fill_count: self.fills.len(),
            border_count: self.borders.len(),
            number_formats: self.num_fmts,
        }
    }
}

fn border_side(border: &mut Border, side: Side) -> &mut BorderSide {
    match side {
        Side::Left => &mut border.left,
        Side::Right => &mut border.right,
        Side::Top => &mut border.top,
        Side::Bottom => &mut border.bottom,
    }
}

/// Parse `xl/styles.xml` into a table indexed by the `s` attribute of cells.
///
/// Malformed XML stops the parse; whatever was read up to that point is kept.
pub fn parse_styles_xml(xml: &str) -> StyleTable {
    let mut parser = StylesParser::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => parser.open(e),
            Ok(Event::Empty(ref e)) => {
                parser.open(e);
                parser.close(e.local_name().as_ref());
            }
            Ok(Event::End(ref e)) => parser.close(e.local_name().as_ref()),
            Ok(Event::Eof) => break,
            Err(err) => {
                log::warn!("styles.xml could not be fully parsed: {}", err);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    parser.finish()
}

/// Parse the layout parts of a worksheet XML.
pub fn parse_sheet_formatting(xml: &str) -> SheetFormatting {
    let mut formatting = SheetFormatting::default();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"row" => {
                    let row = attr_parse::<u32>(e, b"r");
                    let custom = attr(e, b"customHeight").is_some() && attr_flag(e, b"customHeight");
                    if let (true, Some(row), Some(height)) = (custom, row, attr_parse::<f64>(e, b"ht"))
                    {
                        formatting.row_heights.push((row, height));
                    }
                    let formatted = attr(e, b"customFormat").is_some() && attr_flag(e, b"customFormat");
                    if let (true, Some(row), Some(style_id)) =
                        (formatted, row, attr_parse::<usize>(e, b"s"))
                    {
                        formatting.row_styles.push((row, style_id));
                    }
                }
                b"c" => {
                    let style_id = attr_parse::<usize>(e, b"s").unwrap_or(0);
                    if style_id > 0 {
                        if let Some((row, col)) = attr(e, b"r").and_then(|r| parse_cell_name(&r)) {
                            formatting.cell_styles.push((row, col, style_id));
                        }
                    }
                }
                b"col" => {
                    if let (Some(min), Some(max)) =
                        (attr_parse::<u16>(e, b"min"), attr_parse::<u16>(e, b"max"))
                    {
                        let width = attr_parse::<f64>(e, b"width");
                        let style_id = attr_parse::<usize>(e, b"style").filter(|id| *id > 0);
                        for col in min..=max.min(MAX_STYLED_COLUMN) {
                            if let Some(width) = width {
                                formatting.column_widths.push((col, width));
                            }
                            if let Some(style_id) = style_id {
                                formatting.column_styles.push((col, style_id));
                            }
                        }
                    }
                }
                b"mergeCell" => {
                    if let Some(range) = attr(e, b"ref").and_then(|r| MergeRange::parse(&r)) {
                        formatting.merges.push(range);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => {
                log::warn!("worksheet XML could not be fully parsed: {}", err);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    formatting
}

/// Package path of the first worksheet listed in `xl/workbook.xml`.
pub fn first_worksheet_path(workbook_xml: &str, rels_xml: &str) -> Option<String> {
    let first_rid = {
        let mut reader = Reader::from_str(workbook_xml);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut found = None;
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                    if e.local_name().as_ref() == b"sheet" =>
                {
                    found = attr(e, b"r:id");
                    break;
                }
                Ok(Event::Eof) | Err(_) => break,
                _ => {}
            }
            buf.clear();
        }
        found?
    };

    let mut reader = Reader::from_str(rels_xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if attr(e, b"Id").as_deref() == Some(first_rid.as_str()) {
                    let target = attr(e, b"Target")?;
                    return Some(match target.strip_prefix('/') {
                        Some(absolute) => absolute.to_string(),
                        None => format!("xl/{}", target),
                    });
                }
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}
