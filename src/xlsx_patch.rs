//! In-place updates of an existing xlsx package.
//!
//! Rebuilding a workbook from the [`Sheet`] model loses everything the model
//! does not carry. A patch instead copies every entry of the source package
//! byte for byte, except:
//!
//! - the first worksheet, where the rows of one range, the merged ranges and
//!   the dimension are rewritten and everything else streams through;
//! - `xl/styles.xml`, which gains the fonts, fills, borders, number formats
//!   and cell formats the new rows need;
//! - the calculation chain, which is dropped (with its content type and
//!   relationship) so Excel rebuilds it on open.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{Cursor, Write};
use std::ops::RangeInclusive;
use std::path::Path;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::Result;
use crate::schema::cell_name;
use crate::sheet::{CellValue, Sheet};
use crate::style::{
    AlignmentStyle, Border, BorderSide, CellStyle, FillPattern, FillStyle, FontStyle, NumberFormat,
    Rgb,
};
use crate::xlsx::{read_zip_text, worksheet_path};
use crate::xlsx_styles::{FIRST_CUSTOM_NUM_FMT, StyleTable, parse_styles_xml};

const STYLES_PATH: &str = "xl/styles.xml";
const CALC_CHAIN_PATH: &str = "xl/calcChain.xml";
const CONTENT_TYPES_PATH: &str = "[Content_Types].xml";
const WORKBOOK_RELS_PATH: &str = "xl/_rels/workbook.xml.rels";

/// Worksheet children that come after `mergeCells` in schema order.
const AFTER_MERGE_CELLS: &[&[u8]] = &[
    b"phoneticPr",
    b"conditionalFormatting",
    b"dataValidations",
    b"hyperlinks",
    b"printOptions",
    b"pageMargins",
    b"pageSetup",
    b"headerFooter",
    b"rowBreaks",
    b"colBreaks",
    b"customProperties",
    b"cellWatches",
    b"ignoredErrors",
    b"smartTags",
    b"drawing",
    b"legacyDrawing",
    b"legacyDrawingHF",
    b"drawingHF",
    b"picture",
    b"oleObjects",
    b"controls",
    b"webPublishItems",
    b"tableParts",
    b"extLst",
];

#[derive(Debug, Clone, Copy)]
struct XfParts {
    num_fmt: u16,
    font: usize,
    fill: usize,
    border: usize,
}

/// The package's cell formats plus the ones added while writing rows.
///
/// Ids of added parts continue after the package's own lists.
struct StyleRegistry {
    table: StyleTable,
    fonts: Vec<FontStyle>,
    fills: Vec<FillStyle>,
    borders: Vec<Border>,
    num_fmts: Vec<(u16, String)>,
    xfs: Vec<(CellStyle, XfParts)>,
}

impl StyleRegistry {
    fn new(table: StyleTable) -> Self {
        StyleRegistry {
            table,
            fonts: Vec::new(),
            fills: Vec::new(),
            borders: Vec::new(),
            num_fmts: Vec::new(),
            xfs: Vec::new(),
        }
    }

    fn is_unchanged(&self) -> bool {
        self.xfs.is_empty()
    }

    /// `cellXfs` index for `style`, adding a format when none matches.
    fn xf_id(&mut self, style: &CellStyle) -> usize {
        if let Some(id) = self.table.find(style) {
            return id;
        }
        if let Some(pos) = self.xfs.iter().position(|(added, _)| added == style) {
            return self.table.len() + pos;
        }

        let parts = XfParts {
            num_fmt: self.num_fmt_id(style.number_format.as_ref()),
            font: added_id(&mut self.fonts, self.table.font_count, &style.font),
            fill: added_id(&mut self.fills, self.table.fill_count, &style.fill),
            border: added_id(&mut self.borders, self.table.border_count, &style.border),
        };
        self.xfs.push((style.clone(), parts));
        self.table.len() + self.xfs.len() - 1
    }

    fn num_fmt_id(&mut self, format: Option<&NumberFormat>) -> u16 {
        let code = match format {
            None => return 0,
            Some(NumberFormat::Builtin(id)) => return u16::from(*id),
            Some(NumberFormat::Custom(code)) => code,
        };
        let known = self
            .table
            .number_formats
            .iter()
            .map(|(id, code)| (*id, code))
            .chain(self.num_fmts.iter().map(|(id, code)| (*id, code)));
        let mut next = FIRST_CUSTOM_NUM_FMT;
        for (id, existing) in known {
            if existing == code {
                return id;
            }
            next = next.max(id.saturating_add(1));
        }
        self.num_fmts.push((next, code.clone()));
        next
    }

    /// New children per styles.xml section, with the section's new count.
    fn sections(&self) -> [(&'static [u8], usize, String); 5] {
        let num_fmts = self
            .num_fmts
            .iter()
            .map(|(id, code)| {
                format!(r#"<numFmt numFmtId="{}" formatCode="{}"/>"#, id, escape(code.as_str()))
            })
            .collect();
        [
            (
                &b"numFmts"[..],
                self.table.number_formats.len() + self.num_fmts.len(),
                num_fmts,
            ),
            (
                &b"fonts"[..],
                self.table.font_count + self.fonts.len(),
                self.fonts.iter().map(font_xml).collect(),
            ),
            (
                &b"fills"[..],
                self.table.fill_count + self.fills.len(),
                self.fills.iter().map(fill_xml).collect(),
            ),
            (
                &b"borders"[..],
                self.table.border_count + self.borders.len(),
                self.borders.iter().map(border_xml).collect(),
            ),
            (
                &b"cellXfs"[..],
                self.table.len() + self.xfs.len(),
                self.xfs.iter().map(|(style, parts)| xf_xml(style, parts)).collect(),
            ),
        ]
    }
}

/// Id of `item` among the parts added so far, appending it when new.
fn added_id<T: Clone + PartialEq>(added: &mut Vec<T>, existing: usize, item: &T) -> usize {
    match added.iter().position(|known| known == item) {
        Some(pos) => existing + pos,
        None => {
            added.push(item.clone());
            existing + added.len() - 1
        }
    }
}

fn color_xml(tag: &str, color: Option<Rgb>) -> String {
    match color {
        Some(Rgb(rgb)) => format!(r#"<{} rgb="FF{:06X}"/>"#, tag, rgb),
        None => String::new(),
    }
}

fn font_xml(font: &FontStyle) -> String {
    let mut xml = String::from("<font>");
    if font.bold {
        xml.push_str("<b/>");
    }
    if font.italic {
        xml.push_str("<i/>");
    }
    if let Some(size) = font.size {
        xml.push_str(&format!(r#"<sz val="{}"/>"#, size));
    }
    xml.push_str(&color_xml("color", font.color));
    if let Some(name) = &font.name {
        xml.push_str(&format!(r#"<name val="{}"/>"#, escape(name.as_str())));
    }
    xml.push_str("</font>");
    xml
}

fn fill_xml(fill: &FillStyle) -> String {
    if fill.pattern == FillPattern::None {
        return r#"<fill><patternFill patternType="none"/></fill>"#.to_string();
    }
    format!(
        r#"<fill><patternFill patternType="{}">{}{}</patternFill></fill>"#,
        fill.pattern.as_ooxml(),
        color_xml("fgColor", fill.foreground),
        color_xml("bgColor", fill.background)
    )
}

fn border_side_xml(tag: &str, side: &BorderSide) -> String {
    match side.line.as_ooxml() {
        Some(line) => format!(
            r#"<{} style="{}">{}</{}>"#,
            tag,
            line,
            color_xml("color", side.color),
            tag
        ),
        None => format!("<{}/>", tag),
    }
}

fn border_xml(border: &Border) -> String {
    format!(
        "<border>{}{}{}{}<diagonal/></border>",
        border_side_xml("left", &border.left),
        border_side_xml("right", &border.right),
        border_side_xml("top", &border.top),
        border_side_xml("bottom", &border.bottom)
    )
}

fn xf_xml(style: &CellStyle, parts: &XfParts) -> String {
    let mut xml = format!(
        r#"<xf numFmtId="{}" fontId="{}" fillId="{}" borderId="{}" xfId="0" applyFont="1" applyFill="1" applyBorder="1""#,
        parts.num_fmt, parts.font, parts.fill, parts.border
    );
    if parts.num_fmt != 0 {
        xml.push_str(r#" applyNumberFormat="1""#);
    }
    let alignment = &style.alignment;
    if *alignment == AlignmentStyle::default() {
        xml.push_str("/>");
        return xml;
    }
    xml.push_str(r#" applyAlignment="1"><alignment"#);
    if let Some(horizontal) = alignment.horizontal.as_ooxml() {
        xml.push_str(&format!(r#" horizontal="{}""#, horizontal));
    }
    if let Some(vertical) = alignment.vertical.as_ooxml() {
        xml.push_str(&format!(r#" vertical="{}""#, vertical));
    }
    if alignment.wrap {
        xml.push_str(r#" wrapText="1""#);
    }
    xml.push_str("/></xf>");
    xml
}

fn cell_xml(row: u32, col: u16, value: &CellValue, style_id: usize) -> String {
    let reference = cell_name(row, col);
    let style = if style_id == 0 {
        String::new()
    } else {
        format!(r#" s="{}""#, style_id)
    };
    match value {
        CellValue::Empty => format!(r#"<c r="{}"{}/>"#, reference, style),
        CellValue::Text(text) => format!(
            r#"<c r="{}"{} t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
            reference,
            style,
            escape(text.as_str())
        ),
        CellValue::Number(n) | CellValue::DateTime(n) => {
            format!(r#"<c r="{}"{}><v>{}</v></c>"#, reference, style, n)
        }
    }
}

/// `<row>` elements for `rows` of `sheet`, registering the styles they use.
///
/// Cells take their displayed style, so a cell inside a formatted row or
/// column keeps that look once it is written explicitly.
fn rows_xml(sheet: &Sheet, rows: &RangeInclusive<u32>, styles: &mut StyleRegistry) -> String {
    let mut cells_by_row: BTreeMap<u32, String> = BTreeMap::new();

    for ((row, col), cell) in sheet.cells().filter(|((row, _), _)| rows.contains(row)) {
        if cell.value.is_empty() && cell.style.is_default() {
            continue;
        }
        let style_id = sheet
            .effective_style(*row, *col)
            .map(|style| styles.xf_id(style))
            .unwrap_or(0);
        cells_by_row
            .entry(*row)
            .or_default()
            .push_str(&cell_xml(*row, *col, &cell.value, style_id));
    }
    for (row, _) in sheet.row_heights().filter(|(row, _)| rows.contains(*row)) {
        cells_by_row.entry(*row).or_default();
    }
    for (row, _) in sheet.row_styles().filter(|(row, _)| rows.contains(*row)) {
        cells_by_row.entry(*row).or_default();
    }

    let mut xml = String::new();
    for (row, cells) in cells_by_row {
        xml.push_str(&format!(r#"<row r="{}""#, row));
        if let Some(style) = sheet.row_style(row) {
            xml.push_str(&format!(r#" s="{}" customFormat="1""#, styles.xf_id(style)));
        }
        if let Some(height) = sheet.row_height(row) {
            xml.push_str(&format!(r#" ht="{}" customHeight="1""#, height));
        }
        if cells.is_empty() {
            xml.push_str("/>");
        } else {
            xml.push('>');
            xml.push_str(&cells);
            xml.push_str("</row>");
        }
    }
    xml
}

fn merges_xml(sheet: &Sheet) -> String {
    let merges = sheet.merges();
    if merges.is_empty() {
        return String::new();
    }
    let mut xml = format!(r#"<mergeCells count="{}">"#, merges.len());
    for range in merges {
        xml.push_str(&format!(r#"<mergeCell ref="{}"/>"#, range));
    }
    xml.push_str("</mergeCells>");
    xml
}

/// Used range of the sheet, as written in `<dimension>`.
fn dimension(sheet: &Sheet) -> String {
    let (last_row, last_col) = sheet
        .cells()
        .filter(|(_, cell)| !cell.value.is_empty() || !cell.style.is_default())
        .fold((1, 1), |(r, c), ((row, col), _)| (r.max(*row), c.max(*col)));
    format!("A1:{}", cell_name(last_row, last_col))
}

fn attr_value(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

/// Copy of `e` with one attribute set, every other attribute kept as is.
fn with_attribute(e: &BytesStart, key: &str, value: &str) -> BytesStart<'static> {
    let mut out = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    out.extend_attributes(
        e.attributes()
            .flatten()
            .filter(|a| a.key.as_ref() != key.as_bytes()),
    );
    out.push_attribute((key, value));
    out
}

fn write_raw(writer: &mut Writer<Vec<u8>>, xml: &str) {
    writer.get_mut().extend_from_slice(xml.as_bytes());
}

fn into_string(writer: Writer<Vec<u8>>) -> String {
    String::from_utf8_lossy(&writer.into_inner()).into_owned()
}

/// Stream a worksheet, swapping the `<row>` elements inside `rows` for
/// `new_rows` and the merged ranges for `merges`.
fn patch_worksheet(
    xml: &str,
    rows: &RangeInclusive<u32>,
    new_rows: &str,
    merges: &str,
    dimension: &str,
) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + new_rows.len()));

    let mut depth = 0usize;
    let mut skip_depth = 0usize;
    let mut in_sheet_data = false;
    let mut last_row = 0u32;
    let mut rows_written = false;
    let mut merges_written = false;

    loop {
        let event = reader.read_event()?;
        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        match event {
            Event::Eof => break,
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_start = matches!(event, Event::Start(_));
                let local = e.local_name();
                let name = local.as_ref();

                if in_sheet_data && name == b"row" {
                    let row = attr_value(e, b"r")
                        .and_then(|r| r.parse().ok())
                        .unwrap_or(last_row + 1);
                    last_row = row;
                    if rows.contains(&row) {
                        if is_start {
                            skip_depth = 1;
                        }
                        continue;
                    }
                    if row > *rows.end() && !rows_written {
                        write_raw(&mut writer, new_rows);
                        rows_written = true;
                    }
                } else if name == b"sheetData" && !is_start {
                    writer.write_event(Event::Start(BytesStart::new("sheetData")))?;
                    write_raw(&mut writer, new_rows);
                    writer.write_event(Event::End(e.to_end()))?;
                    rows_written = true;
                    continue;
                } else if name == b"dimension" && !is_start {
                    writer.write_event(Event::Empty(with_attribute(e, "ref", dimension)))?;
                    continue;
                } else if name == b"mergeCells" && depth == 1 {
                    write_raw(&mut writer, merges);
                    merges_written = true;
                    if is_start {
                        skip_depth = 1;
                    }
                    continue;
                } else if depth == 1 && !merges_written && AFTER_MERGE_CELLS.contains(&name) {
                    write_raw(&mut writer, merges);
                    merges_written = true;
                }

                if is_start {
                    if name == b"sheetData" {
                        in_sheet_data = true;
                    }
                    depth += 1;
                }
                writer.write_event(event)?;
            }
            Event::End(ref e) => {
                match e.local_name().as_ref() {
                    b"sheetData" => {
                        if !rows_written {
                            write_raw(&mut writer, new_rows);
                            rows_written = true;
                        }
                        in_sheet_data = false;
                    }
                    b"worksheet" if !merges_written => {
                        write_raw(&mut writer, merges);
                        merges_written = true;
                    }
                    _ => {}
                }
                depth = depth.saturating_sub(1);
                writer.write_event(event)?;
            }
            other => writer.write_event(other)?,
        }
    }

    Ok(into_string(writer))
}

/// Append the registry's new parts to `styles.xml`, fixing every `count`.
fn patch_styles(xml: &str, styles: &StyleRegistry) -> Result<String> {
    if styles.is_unchanged() {
        return Ok(xml.to_string());
    }
    let sections = styles.sections();
    let section = |name: &[u8]| sections.iter().find(|(tag, _, _)| *tag == name);
    let (_, num_fmt_count, num_fmt_items) = &sections[0];

    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() * 2));
    let mut num_fmts_seen = false;

    loop {
        let event = reader.read_event()?;
        match event {
            Event::Eof => break,
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_start = matches!(event, Event::Start(_));
                let local = e.local_name();
                let name = local.as_ref();
                if name == b"numFmts" {
                    num_fmts_seen = true;
                }
                // numFmts is optional and must come before fonts.
                if name == b"fonts" && !num_fmts_seen && !num_fmt_items.is_empty() {
                    write_raw(
                        &mut writer,
                        &format!(r#"<numFmts count="{}">{}</numFmts>"#, num_fmt_count, num_fmt_items),
                    );
                    num_fmts_seen = true;
                }
                match section(name) {
                    Some((_, count, items)) => {
                        let start = with_attribute(e, "count", &count.to_string());
                        if is_start {
                            writer.write_event(Event::Start(start))?;
                        } else {
                            let end = start.to_end().into_owned();
                            writer.write_event(Event::Start(start))?;
                            write_raw(&mut writer, items);
                            writer.write_event(Event::End(end))?;
                        }
                    }
                    None => writer.write_event(event)?,
                }
            }
            Event::End(ref e) => {
                if let Some((_, _, items)) = section(e.local_name().as_ref()) {
                    write_raw(&mut writer, items);
                }
                writer.write_event(event)?;
            }
            other => writer.write_event(other)?,
        }
    }

    Ok(into_string(writer))
}

/// Drop `tag` elements whose `key` attribute points at the calculation chain.
fn drop_calc_chain_refs(xml: &str, tag: &[u8], key: &[u8]) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut skip_depth = 0usize;

    loop {
        let event = reader.read_event()?;
        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => break,
                _ => {}
            }
            continue;
        }
        match event {
            Event::Eof => break,
            Event::Start(ref e) | Event::Empty(ref e)
                if e.local_name().as_ref() == tag
                    && attr_value(e, key).is_some_and(|v| v.ends_with("calcChain.xml")) =>
            {
                if matches!(event, Event::Start(_)) {
                    skip_depth = 1;
                }
            }
            other => writer.write_event(other)?,
        }
    }

    Ok(into_string(writer))
}

/// Patch rows `rows` of the first worksheet of the package at `source` with
/// the content of `sheet`, returning the new package bytes.
///
/// Returns `None` when the package has no style table or no first worksheet
/// to patch.
pub fn patch_package(
    source: &Path,
    sheet: &Sheet,
    rows: RangeInclusive<u32>,
) -> Result<Option<Vec<u8>>> {
    let mut archive = ZipArchive::new(File::open(source)?)?;
    let sheet_path = worksheet_path(&mut archive)?;
    let (Some(styles_xml), Some(sheet_xml)) = (
        read_zip_text(&mut archive, STYLES_PATH)?,
        read_zip_text(&mut archive, &sheet_path)?,
    ) else {
        return Ok(None);
    };

    let table = parse_styles_xml(&styles_xml);
    if table.is_empty() {
        return Ok(None);
    }
    let mut styles = StyleRegistry::new(table);
    let new_rows = rows_xml(sheet, &rows, &mut styles);

    let mut replaced: HashMap<String, String> = HashMap::new();
    replaced.insert(
        sheet_path,
        patch_worksheet(&sheet_xml, &rows, &new_rows, &merges_xml(sheet), &dimension(sheet))?,
    );
    replaced.insert(STYLES_PATH.to_string(), patch_styles(&styles_xml, &styles)?);

    let has_calc_chain = archive.index_for_name(CALC_CHAIN_PATH).is_some();
    if has_calc_chain {
        let refs: [(&str, &[u8], &[u8]); 2] = [
            (CONTENT_TYPES_PATH, &b"Override"[..], &b"PartName"[..]),
            (WORKBOOK_RELS_PATH, &b"Relationship"[..], &b"Target"[..]),
        ];
        for (path, tag, key) in refs {
            if let Some(xml) = read_zip_text(&mut archive, path)? {
                replaced.insert(path.to_string(), drop_calc_chain_refs(&xml, tag, key)?);
            }
        }
    }

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index)?;
        let name = entry.name().to_string();
        if has_calc_chain && name == CALC_CHAIN_PATH {
            continue;
        }
        match replaced.get(&name) {
            Some(content) => {
                drop(entry);
                writer.start_file(name, options)?;
                writer.write_all(content.as_bytes())?;
            }
            None => writer.raw_copy_file(entry)?,
        }
    }

    Ok(Some(writer.finish()?.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::MergeRange;
    use crate::style::{BorderLine, base_data_style, totals_style};
    use crate::xlsx_styles::parse_sheet_formatting;

    const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="1"><font><sz val="11"/><color theme="1"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#;

    const WORKSHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A5:B12"/><sheetData><row r="5"><c r="A5"><f>1+1</f><v>2</v></c></row><row r="11"><c r="B11" t="s"><v>0</v></c></row><row r="12"><c r="B12" t="s"><v>1</v></c></row><row r="300"><c r="A300" t="s"><v>2</v></c></row></sheetData><dataValidations count="1"><dataValidation type="list" sqref="C11:C299"><formula1>"a,b"</formula1></dataValidation></dataValidations><pageSetup orientation="landscape"/></worksheet>"#;

    #[test]
    fn worksheet_rows_in_range_are_replaced_and_the_rest_is_kept() {
        let new_rows = r#"<row r="11"><c r="B11" t="inlineStr"><is><t>X-1</t></is></c></row>"#;

        let patched = patch_worksheet(
            WORKSHEET,
            &(11..=299),
            new_rows,
            r#"<mergeCells count="1"><mergeCell ref="A1:Q2"/></mergeCells>"#,
            "A1:Q300",
        )
        .unwrap();

        assert!(patched.contains(r#"<row r="5"><c r="A5"><f>1+1</f><v>2</v></c></row>"#));
        assert!(patched.contains(&format!("{}{}", new_rows, r#"<row r="300">"#)));
        assert!(!patched.contains(r#"<row r="12">"#));
        assert!(patched.contains(r#"<dimension ref="A1:Q300"/>"#));
        assert!(patched.contains(
            r#"</sheetData><mergeCells count="1"><mergeCell ref="A1:Q2"/></mergeCells><dataValidations"#
        ));
        assert!(patched.contains(r#"<pageSetup orientation="landscape"/>"#));
    }

    #[test]
    fn rows_after_the_last_one_go_at_the_end_of_sheet_data() {
        let xml = r#"<worksheet><sheetData><row r="1"><c r="A1"><v>1</v></c></row></sheetData><mergeCells count="1"><mergeCell ref="A20:Q20"/></mergeCells></worksheet>"#;

        let patched = patch_worksheet(xml, &(20..=20), r#"<row r="20"/>"#, "", "A1:A20").unwrap();

        assert_eq!(
            patched,
            r#"<worksheet><sheetData><row r="1"><c r="A1"><v>1</v></c></row><row r="20"/></sheetData></worksheet>"#
        );

        let empty = patch_worksheet("<worksheet><sheetData/></worksheet>", &(1..=1), r#"<row r="1"/>"#, "", "A1:A1")
            .unwrap();
        assert_eq!(empty, r#"<worksheet><sheetData><row r="1"/></sheetData></worksheet>"#);
    }

    #[test]
    fn new_styles_are_appended_and_counted() {
        let mut styles = StyleRegistry::new(parse_styles_xml(STYLES));
        let mut dated = base_data_style();
        dated.number_format = Some(NumberFormat::Custom("dd/mm/yyyy".to_string()));

        assert_eq!(styles.xf_id(&base_data_style()), 1);
        assert_eq!(styles.xf_id(&totals_style()), 2);
        assert_eq!(styles.xf_id(&base_data_style()), 1);
        assert_eq!(styles.xf_id(&dated), 3);

        let patched = patch_styles(STYLES, &styles).unwrap();
        assert!(patched.contains(r#"<cellXfs count="4">"#));
        assert!(patched.contains(r#"<numFmts count="1"><numFmt numFmtId="164" formatCode="dd/mm/yyyy"/></numFmts><fonts"#));

        let table = parse_styles_xml(&patched);
        assert_eq!(table.len(), 4);
        assert_eq!(table.get(1), Some(&base_data_style()));
        assert_eq!(table.get(2), Some(&totals_style()));
        assert_eq!(table.get(3), Some(&dated));
        assert_eq!(table.get(0), parse_styles_xml(STYLES).get(0));
    }

    #[test]
    fn unchanged_styles_are_returned_as_is() {
        let styles = StyleRegistry::new(parse_styles_xml(STYLES));

        assert_eq!(patch_styles(STYLES, &styles).unwrap(), STYLES);
    }

    #[test]
    fn row_xml_carries_values_styles_and_heights() {
        let mut styles = StyleRegistry::new(parse_styles_xml(STYLES));
        let mut sheet = Sheet::new("Hoja1");
        sheet.set_value(11, 1, CellValue::Number(1.0));
        sheet.set_value(11, 2, CellValue::text("a < b"));
        sheet.set_style(11, 2, base_data_style());
        sheet.set_row_height(11, 20.0);
        sheet.set_value(300, 1, CellValue::text("fuera"));

        let xml = rows_xml(&sheet, &(11..=299), &mut styles);

        assert_eq!(
            xml,
            r#"<row r="11" ht="20" customHeight="1"><c r="A11"><v>1</v></c><c r="B11" s="1" t="inlineStr"><is><t xml:space="preserve">a &lt; b</t></is></c></row>"#
        );
    }

    #[test]
    fn merges_and_dimension_follow_the_sheet() {
        let mut sheet = Sheet::new("Hoja1");
        sheet.set_value(14, 3, CellValue::text("x"));
        sheet.merge(MergeRange::new(15, 1, 15, 17));

        assert_eq!(dimension(&sheet), "A1:C14");
        assert_eq!(
            merges_xml(&sheet),
            r#"<mergeCells count="1"><mergeCell ref="A15:Q15"/></mergeCells>"#
        );

        let formatting = parse_sheet_formatting(&format!("<worksheet>{}</worksheet>", merges_xml(&sheet)));
        assert_eq!(formatting.merges, vec![MergeRange::new(15, 1, 15, 17)]);
        assert_eq!(merges_xml(&Sheet::new("Hoja1")), "");
    }

    #[test]
    fn calc_chain_references_are_dropped() {
        let types = r#"<Types><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/calcChain.xml" ContentType="calc"/><Override PartName="/xl/styles.xml" ContentType="styles"/></Types>"#;

        let patched = drop_calc_chain_refs(types, b"Override", b"PartName").unwrap();

        assert_eq!(
            patched,
            r#"<Types><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/styles.xml" ContentType="styles"/></Types>"#
        );
    }

    #[test]
    fn border_and_fill_parts_round_trip_through_the_style_parser() {
        let mut style = CellStyle::default();
        style.fill = FillStyle {
            pattern: FillPattern::DarkTrellis,
            foreground: Some(Rgb(0x123456)),
            background: Some(Rgb(0xABCDEF)),
        };
        style.border.left = BorderSide::new(BorderLine::Dashed);
        style.border.bottom = BorderSide {
            line: BorderLine::Double,
            color: None,
        };
        let mut styles = StyleRegistry::new(parse_styles_xml(STYLES));
        styles.xf_id(&style);

        let table = parse_styles_xml(&patch_styles(STYLES, &styles).unwrap());

        assert_eq!(table.get(1), Some(&style));
    }
}
