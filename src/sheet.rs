//! In-memory worksheet grid.
//!
//! A [`Sheet`] holds what the ledger needs from one worksheet: cell values,
//! per-cell style descriptors, custom row heights, column widths and merged
//! ranges. Rows and columns are 1-based.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Duration, NaiveDate};

use crate::schema::{cell_name, parse_cell_name};
use crate::style::CellStyle;

#[derive(Debug, Clone, Default, PartialEq)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    /// Excel serial date/time (days since 1899-12-30).
    DateTime(f64),
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Text(s.into())
    }

    /// Text or empty: an empty string is stored as no value at all.
    pub fn from_text(s: &str) -> Self {
        if s.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(s.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Display text: integers without decimals, dates as `dd/mm/yyyy`,
    /// times as `HH:MM`.
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::DateTime(serial) => serial_to_text(*serial),
        }
    }
}

const MINUTES_PER_DAY: i64 = 24 * 60;

fn serial_to_text(serial: f64) -> String {
    let Some(epoch) = NaiveDate::from_ymd_opt(1899, 12, 30) else {
        return serial.to_string();
    };
    // Round to the minute first so 23:59:59.9 lands on the next day.
    let total = (serial * MINUTES_PER_DAY as f64).round() as i64;
    let days = total.div_euclid(MINUTES_PER_DAY);
    let minutes = total.rem_euclid(MINUTES_PER_DAY);
    let time = format!("{:02}:{:02}", minutes / 60, minutes % 60);

    if days < 1 {
        return time;
    }
    let date = epoch + Duration::days(days);
    if minutes == 0 {
        date.format("%d/%m/%Y").to_string()
    } else {
        format!("{} {}", date.format("%d/%m/%Y"), time)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    pub style: CellStyle,
}

/// Inclusive rectangular range of merged cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeRange {
    pub first_row: u32,
    pub first_col: u16,
    pub last_row: u32,
    pub last_col: u16,
}

impl MergeRange {
    pub fn new(first_row: u32, first_col: u16, last_row: u32, last_col: u16) -> Self {
        MergeRange {
            first_row,
            first_col,
            last_row,
            last_col,
        }
    }

    /// Parse a reference like `A12:Q12`.
    pub fn parse(reference: &str) -> Option<Self> {
        let (start, end) = reference.split_once(':')?;
        let (first_row, first_col) = parse_cell_name(start)?;
        let (last_row, last_col) = parse_cell_name(end)?;
        Some(MergeRange::new(first_row, first_col, last_row, last_col))
    }

    pub fn touches_rows(&self, first: u32, last: u32) -> bool {
        self.first_row <= last && self.last_row >= first
    }

    pub fn contains(&self, row: u32, col: u16) -> bool {
        (self.first_row..=self.last_row).contains(&row)
            && (self.first_col..=self.last_col).contains(&col)
    }
}

impl fmt::Display for MergeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            cell_name(self.first_row, self.first_col),
            cell_name(self.last_row, self.last_col)
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub name: String,
    cells: BTreeMap<(u32, u16), Cell>,
    row_heights: BTreeMap<u32, f64>,
    column_widths: BTreeMap<u16, f64>,
    /// Default styles of whole rows and columns, for cells not written.
    row_styles: BTreeMap<u32, CellStyle>,
    column_styles: BTreeMap<u16, CellStyle>,
    merges: Vec<MergeRange>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Sheet {
            name: name.into(),
            ..Sheet::default()
        }
    }

    pub fn cell(&self, row: u32, col: u16) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (&(u32, u16), &Cell)> {
        self.cells.iter()
    }

    /// Display text of a cell; empty when the cell does not exist.
    pub fn text(&self, row: u32, col: u16) -> String {
        self.cell(row, col)
            .map(|cell| cell.value.to_text())
            .unwrap_or_default()
    }

    pub fn has_value(&self, row: u32, col: u16) -> bool {
        self.cell(row, col)
            .map(|cell| !cell.value.is_empty())
            .unwrap_or(false)
    }

    /// Replace a cell's value, keeping its style.
    pub fn set_value(&mut self, row: u32, col: u16, value: CellValue) {
        self.cells.entry((row, col)).or_default().value = value;
    }

    /// Replace a cell's style, keeping its value.
    pub fn set_style(&mut self, row: u32, col: u16, style: CellStyle) {
        self.cells.entry((row, col)).or_default().style = style;
    }

    /// Highest row holding a cell or a custom height; 0 for an empty sheet.
    pub fn max_row(&self) -> u32 {
        let cell_max = self.cells.keys().next_back().map(|(r, _)| *r).unwrap_or(0);
        let height_max = self.row_heights.keys().next_back().copied().unwrap_or(0);
        cell_max.max(height_max)
    }

    pub fn row_height(&self, row: u32) -> Option<f64> {
        self.row_heights.get(&row).copied()
    }

    pub fn set_row_height(&mut self, row: u32, height: f64) {
        self.row_heights.insert(row, height);
    }

    pub fn row_heights(&self) -> impl Iterator<Item = (&u32, &f64)> {
        self.row_heights.iter()
    }

    pub fn column_width(&self, col: u16) -> Option<f64> {
        self.column_widths.get(&col).copied()
    }

    pub fn set_column_width(&mut self, col: u16, width: f64) {
        self.column_widths.insert(col, width);
    }

    pub fn column_widths(&self) -> impl Iterator<Item = (&u16, &f64)> {
        self.column_widths.iter()
    }

    pub fn row_style(&self, row: u32) -> Option<&CellStyle> {
        self.row_styles.get(&row)
    }

    pub fn set_row_style(&mut self, row: u32, style: CellStyle) {
        self.row_styles.insert(row, style);
    }

    pub fn row_styles(&self) -> impl Iterator<Item = (&u32, &CellStyle)> {
        self.row_styles.iter()
    }

    pub fn set_column_style(&mut self, col: u16, style: CellStyle) {
        self.column_styles.insert(col, style);
    }

    pub fn column_styles(&self) -> impl Iterator<Item = (&u16, &CellStyle)> {
        self.column_styles.iter()
    }

    /// Style a cell is displayed with: its own, else its row's default, else
    /// its column's default.
    pub fn effective_style(&self, row: u32, col: u16) -> Option<&CellStyle> {
        self.cell(row, col)
            .map(|cell| &cell.style)
            .filter(|style| !style.is_default())
            .or_else(|| self.row_styles.get(&row))
            .or_else(|| self.column_styles.get(&col))
    }

    pub fn merges(&self) -> &[MergeRange] {
        &self.merges
    }

    pub fn merge(&mut self, range: MergeRange) {
        self.merges.push(range);
    }

    /// Drop every merged range overlapping rows `first..=last`.
    pub fn unmerge_rows(&mut self, first: u32, last: u32) {
        self.merges.retain(|m| !m.touches_rows(first, last));
    }

    /// Blank rows `first..=last` in place: values, styles and heights go,
    /// nothing below moves.
    pub fn clear_rows(&mut self, first: u32, last: u32) {
        if first > last {
            return;
        }
        self.cells.retain(|(row, _), _| *row < first || *row > last);
        self.row_heights.retain(|row, _| *row < first || *row > last);
        self.row_styles.retain(|row, _| *row < first || *row > last);
    }

    /// Remove `count` rows starting at `start` and shift everything below up.
    pub fn delete_rows(&mut self, start: u32, count: u32) {
        if count == 0 {
            return;
        }
        let end = start + count; // first row that survives below the hole
        let shift = |row: u32| if row >= end { row - count } else { row };

        self.cells = std::mem::take(&mut self.cells)
            .into_iter()
            .filter(|((row, _), _)| *row < start || *row >= end)
            .map(|((row, col), cell)| ((shift(row), col), cell))
            .collect();

        self.row_heights = std::mem::take(&mut self.row_heights)
            .into_iter()
            .filter(|(row, _)| *row < start || *row >= end)
            .map(|(row, h)| (shift(row), h))
            .collect();

        self.row_styles = std::mem::take(&mut self.row_styles)
            .into_iter()
            .filter(|(row, _)| *row < start || *row >= end)
            .map(|(row, style)| (shift(row), style))
            .collect();

        self.merges = std::mem::take(&mut self.merges)
            .into_iter()
            .filter(|m| !m.touches_rows(start, end - 1))
            .map(|m| MergeRange {
                first_row: shift(m.first_row),
                last_row: shift(m.last_row),
                ..m
            })
            .collect();
    }
}
