//! Reading and writing ledger workbooks.
//!
//! Values come from calamine, formatting from [`crate::xlsx_styles`].
//!
//! There are two ways back to disk. [`save`] rebuilds the whole package with
//! rust_xlsxwriter from the in-memory [`Sheet`], so anything the model does
//! not carry (extra sheets, formulas, validations, page setup) is lost; it is
//! used for new workbooks. [`update`] patches an existing package through
//! [`crate::xlsx_patch`] and only touches the rows it is told to.

use std::fs::File;
use std::io::{Read, Seek, Write};
use std::ops::RangeInclusive;
use std::path::Path;

use calamine::{Data, Reader, Xlsx, open_workbook};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, FormatPattern, Workbook};
use tempfile::NamedTempFile;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{LedgerError, Result};
use crate::sheet::{CellValue, Sheet};
use crate::style::{
    BorderLine, CellStyle, FillPattern, HorizontalAlign, NumberFormat, VerticalAlign,
};
use crate::xlsx_patch::patch_package;
use crate::xlsx_styles::{
    DEFAULT_SHEET_PATH, SheetFormatting, StyleTable, first_worksheet_path, parse_sheet_formatting,
    parse_styles_xml,
};

/// Pixel width of one character of the default font.
const MAX_DIGIT_WIDTH: f64 = 7.0;
/// Pixels Excel adds around the text of every column.
const COLUMN_PADDING: f64 = 5.0;

/// Load the first worksheet of an xlsx file.
///
/// Cell values, per-cell styles, custom row heights, column widths and merged
/// ranges are read. Other sheets are ignored.
///
/// # Arguments
/// * `path` - Workbook to read
///
/// # Returns
/// * `Result<Sheet>` - The sheet, or `LedgerError::Workbook` when the file is
///   not a readable xlsx package
pub fn load(path: &Path) -> Result<Sheet> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| LedgerError::Workbook("el libro no contiene hojas".to_string()))?;
    let range = workbook.worksheet_range(&name)?;

    let mut sheet = Sheet::new(name);
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    for (r, row) in range.rows().enumerate() {
        for (c, data) in row.iter().enumerate() {
            let value = cell_value(data);
            if value.is_empty() {
                continue;
            }
            let row_num = start_row + r as u32 + 1;
            let col_num = (start_col as usize + c + 1) as u16;
            sheet.set_value(row_num, col_num, value);
        }
    }

    let (styles, formatting) = read_formatting(path)?;
    apply_formatting(&mut sheet, &styles, formatting);

    log::debug!(
        "loaded '{}' from {} ({} rows)",
        sheet.name,
        path.display(),
        sheet.max_row()
    );
    Ok(sheet)
}

fn cell_value(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::from_text(s),
        Data::Float(n) => CellValue::Number(*n),
        Data::Int(n) => CellValue::Number(*n as f64),
        Data::Bool(b) => CellValue::text(if *b { "TRUE" } else { "FALSE" }),
        Data::DateTime(dt) => CellValue::DateTime(dt.as_f64()),
        Data::Error(e) => CellValue::text(format!("#{:?}", e)),
    }
}

pub(crate) fn read_zip_text<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Option<String>> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(Some(content))
}

/// Package path of the first worksheet, falling back to the usual name.
pub(crate) fn worksheet_path<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<String> {
    let workbook_xml = read_zip_text(archive, "xl/workbook.xml")?;
    let rels_xml = read_zip_text(archive, "xl/_rels/workbook.xml.rels")?;
    Ok(match (workbook_xml, rels_xml) {
        (Some(workbook), Some(rels)) => first_worksheet_path(&workbook, &rels),
        _ => None,
    }
    .unwrap_or_else(|| DEFAULT_SHEET_PATH.to_string()))
}

fn read_formatting(path: &Path) -> Result<(StyleTable, SheetFormatting)> {
    let mut archive = ZipArchive::new(File::open(path)?)?;

    let styles = read_zip_text(&mut archive, "xl/styles.xml")?
        .map(|xml| parse_styles_xml(&xml))
        .unwrap_or_default();

    let sheet_path = worksheet_path(&mut archive)?;
    let formatting = read_zip_text(&mut archive, &sheet_path)?
        .map(|xml| parse_sheet_formatting(&xml))
        .unwrap_or_default();

    Ok((styles, formatting))
}

fn apply_formatting(sheet: &mut Sheet, styles: &StyleTable, formatting: SheetFormatting) {
    for (row, col, id) in formatting.cell_styles {
        if let Some(style) = styles.get(id) {
            sheet.set_style(row, col, style.clone());
        }
    }
    for (row, height) in formatting.row_heights {
        sheet.set_row_height(row, height);
    }
    for (row, id) in formatting.row_styles {
        if let Some(style) = styles.get(id) {
            sheet.set_row_style(row, style.clone());
        }
    }
    for (col, id) in formatting.column_styles {
        if let Some(style) = styles.get(id) {
            sheet.set_column_style(col, style.clone());
        }
    }
    for (col, width) in formatting.column_widths {
        sheet.set_column_width(col, stored_width_to_chars(width));
    }
    for range in formatting.merges {
        sheet.merge(range);
    }
}

/// Convert a width as stored in the file, which includes cell padding, back
/// to the character width rust_xlsxwriter expects. Keeps widths stable across
/// repeated load/save cycles.
fn stored_width_to_chars(width: f64) -> f64 {
    let pixels = (width * MAX_DIGIT_WIDTH).round();
    if pixels <= MAX_DIGIT_WIDTH + COLUMN_PADDING {
        pixels / (MAX_DIGIT_WIDTH + COLUMN_PADDING)
    } else {
        (pixels - COLUMN_PADDING) / MAX_DIGIT_WIDTH
    }
}

fn border_format(line: BorderLine) -> FormatBorder {
    match line {
        BorderLine::None => FormatBorder::None,
        BorderLine::Hair => FormatBorder::Hair,
        BorderLine::Thin => FormatBorder::Thin,
        BorderLine::Medium => FormatBorder::Medium,
        BorderLine::Thick => FormatBorder::Thick,
        BorderLine::Double => FormatBorder::Double,
        BorderLine::Dashed => FormatBorder::Dashed,
        BorderLine::Dotted => FormatBorder::Dotted,
    }
}

fn pattern_format(pattern: FillPattern) -> FormatPattern {
    match pattern {
        FillPattern::None => FormatPattern::None,
        FillPattern::Solid => FormatPattern::Solid,
        FillPattern::MediumGray => FormatPattern::MediumGray,
        FillPattern::DarkGray => FormatPattern::DarkGray,
        FillPattern::LightGray => FormatPattern::LightGray,
        FillPattern::DarkHorizontal => FormatPattern::DarkHorizontal,
        FillPattern::DarkVertical => FormatPattern::DarkVertical,
        FillPattern::DarkDown => FormatPattern::DarkDown,
        FillPattern::DarkUp => FormatPattern::DarkUp,
        FillPattern::DarkGrid => FormatPattern::DarkGrid,
        FillPattern::DarkTrellis => FormatPattern::DarkTrellis,
        FillPattern::LightHorizontal => FormatPattern::LightHorizontal,
        FillPattern::LightVertical => FormatPattern::LightVertical,
        FillPattern::LightDown => FormatPattern::LightDown,
        FillPattern::LightUp => FormatPattern::LightUp,
        FillPattern::LightGrid => FormatPattern::LightGrid,
        FillPattern::LightTrellis => FormatPattern::LightTrellis,
        FillPattern::Gray125 => FormatPattern::Gray125,
        FillPattern::Gray0625 => FormatPattern::Gray0625,
    }
}

/// Translate a style descriptor into a rust_xlsxwriter format.
fn build_format(style: &CellStyle) -> Format {
    let mut format = Format::new();

    let font = &style.font;
    if let Some(name) = &font.name {
        format = format.set_font_name(name);
    }
    if let Some(size) = font.size {
        format = format.set_font_size(size);
    }
    if let Some(color) = font.color {
        format = format.set_font_color(Color::RGB(color.0));
    }
    if font.bold {
        format = format.set_bold();
    }
    if font.italic {
        format = format.set_italic();
    }

    let fill = &style.fill;
    match fill.pattern {
        FillPattern::None => {}
        // rust_xlsxwriter writes the background colour of a solid fill as its fgColor.
        FillPattern::Solid => {
            if let Some(color) = fill.foreground {
                format = format.set_background_color(Color::RGB(color.0));
            }
        }
        pattern => {
            format = format.set_pattern(pattern_format(pattern));
            if let Some(color) = fill.foreground {
                format = format.set_foreground_color(Color::RGB(color.0));
            }
            if let Some(color) = fill.background {
                format = format.set_background_color(Color::RGB(color.0));
            }
        }
    }

    let border = &style.border;
    if border.top.line != BorderLine::None {
        format = format.set_border_top(border_format(border.top.line));
        if let Some(color) = border.top.color {
            format = format.set_border_top_color(Color::RGB(color.0));
        }
    }
    if border.bottom.line != BorderLine::None {
        format = format.set_border_bottom(border_format(border.bottom.line));
        if let Some(color) = border.bottom.color {
            format = format.set_border_bottom_color(Color::RGB(color.0));
        }
    }
    if border.left.line != BorderLine::None {
        format = format.set_border_left(border_format(border.left.line));
        if let Some(color) = border.left.color {
            format = format.set_border_left_color(Color::RGB(color.0));
        }
    }
    if border.right.line != BorderLine::None {
        format = format.set_border_right(border_format(border.right.line));
        if let Some(color) = border.right.color {
            format = format.set_border_right_color(Color::RGB(color.0));
        }
    }

    format = match style.alignment.horizontal {
        HorizontalAlign::General => format,
        HorizontalAlign::Left => format.set_align(FormatAlign::Left),
        HorizontalAlign::Center => format.set_align(FormatAlign::Center),
        HorizontalAlign::Right => format.set_align(FormatAlign::Right),
        HorizontalAlign::Fill => format.set_align(FormatAlign::Fill),
        HorizontalAlign::Justify => format.set_align(FormatAlign::Justify),
        HorizontalAlign::CenterAcross => format.set_align(FormatAlign::CenterAcross),
    };
    format = match style.alignment.vertical {
        VerticalAlign::Bottom => format,
        VerticalAlign::Top => format.set_align(FormatAlign::Top),
        VerticalAlign::Center => format.set_align(FormatAlign::VerticalCenter),
        VerticalAlign::Justify => format.set_align(FormatAlign::VerticalJustify),
    };
    if style.alignment.wrap {
        format = format.set_text_wrap();
    }

    match &style.number_format {
        Some(NumberFormat::Builtin(index)) => format.set_num_format_index(*index),
        Some(NumberFormat::Custom(code)) => format.set_num_format(code),
        None => format,
    }
}

/// Serialise a sheet into xlsx bytes.
///
/// Merged ranges are written first; the cells inside them are then written
/// with their own formats so per-cell borders survive the merge.
///
/// # Arguments
/// * `sheet` - Sheet to write as the only worksheet of the workbook
///
/// # Returns
/// * `Result<Vec<u8>>` - XLSX file content as bytes or a `LedgerError::Workbook`
pub fn to_xlsx(sheet: &Sheet) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    if !sheet.name.is_empty() {
        worksheet.set_name(&sheet.name)?;
    }

    for (col, width) in sheet.column_widths() {
        worksheet.set_column_width(col - 1, *width)?;
    }
    for (row, height) in sheet.row_heights() {
        worksheet.set_row_height(row - 1, *height)?;
    }
    for (col, style) in sheet.column_styles() {
        worksheet.set_column_format(col - 1, &build_format(style))?;
    }
    for (row, style) in sheet.row_styles() {
        worksheet.set_row_format(row - 1, &build_format(style))?;
    }

    for range in sheet.merges() {
        if range.first_row == range.last_row && range.first_col == range.last_col {
            continue;
        }
        let format = sheet
            .effective_style(range.first_row, range.first_col)
            .map(build_format)
            .unwrap_or_else(Format::new);
        worksheet.merge_range(
            range.first_row - 1,
            range.first_col - 1,
            range.last_row - 1,
            range.last_col - 1,
            "",
            &format,
        )?;
    }

    for ((row, col), cell) in sheet.cells() {
        let (r, c) = (row - 1, col - 1);
        let style = sheet.effective_style(*row, *col).unwrap_or(&cell.style);
        let format = build_format(style);
        match &cell.value {
            CellValue::Empty => {
                if !style.is_default() {
                    worksheet.write_blank(r, c, &format)?;
                }
            }
            CellValue::Text(s) => {
                worksheet.write_string_with_format(r, c, s, &format)?;
            }
            CellValue::Number(n) | CellValue::DateTime(n) => {
                worksheet.write_number_with_format(r, c, *n, &format)?;
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// Write a sheet to `path` as a new single-sheet workbook, replacing the file
/// atomically.
///
/// # Arguments
/// * `sheet` - Sheet to write
/// * `path` - Destination file
///
/// # Returns
/// * `Result<()>` - Ok on success, `LedgerError::Workbook` or `LedgerError::Io` on failure
pub fn save(sheet: &Sheet, path: &Path) -> Result<()> {
    let buffer = to_xlsx(sheet)?;
    write_atomic(&buffer, path)?;

    log::debug!("saved '{}' to {}", sheet.name, path.display());
    Ok(())
}

/// Write `sheet`'s rows `rows` into the package at `source` and store the
/// result at `dest`, which may be `source` itself.
///
/// Every other part of the package is copied unchanged: other sheets,
/// formulas and rows outside the range, data validations, page setup and
/// the original cell formats. Merged ranges are taken from `sheet`. Falls
/// back to [`save`] when `source` has no style table or worksheet to patch.
///
/// # Arguments
/// * `sheet` - Sheet loaded from `source` and modified only inside `rows`
/// * `source` - Workbook to patch
/// * `dest` - Destination file, replaced atomically
/// * `rows` - 1-based rows to rewrite
pub fn update(sheet: &Sheet, source: &Path, dest: &Path, rows: RangeInclusive<u32>) -> Result<()> {
    match patch_package(source, sheet, rows.clone())? {
        Some(buffer) => write_atomic(&buffer, dest)?,
        None => {
            log::warn!(
                "{} cannot be patched in place, rewriting it whole",
                source.display()
            );
            return save(sheet, dest);
        }
    }

    log::debug!(
        "updated rows {}..={} of '{}' into {}",
        rows.start(),
        rows.end(),
        sheet.name,
        dest.display()
    );
    Ok(())
}

/// Serialise to a temporary file in the same directory and rename it over
/// `path`, so readers never see a half-written file and a failed write leaves
/// the previous content intact.
fn write_atomic(buffer: &[u8], path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(buffer)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| LedgerError::Io(e.error))?;
    Ok(())
}
