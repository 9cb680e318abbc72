//! Signed export copies of a ledger.
//!
//! An export is a dated copy of the ledger with one extra row below the data
//! and aggregate rows: the defender's signature line, merged across the
//! schema width and boxed with a thick border.

use std::path::Path;

use chrono::NaiveDate;

use crate::schema::{
    COL_CASE_ID, COL_HELD_NO, COL_HELD_YES, COL_NUMBER, COL_REASONS_END, COL_REASONS_START,
    COLUMN_COUNT, EXPORT_MARKER, HEADER_ROW, SIGNATURE_LABEL, XLSX_EXTENSION,
};
use crate::sheet::{CellValue, MergeRange, Sheet};
use crate::style::signature_style;

/// Name of the export of `ledger_name` made on `date`:
/// `<stem>_exportado_<YYYYMMDD>.xlsx`.
pub fn export_file_name(ledger_name: &str, date: NaiveDate) -> String {
    let stem = Path::new(ledger_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!(
        "{}{}{}.{}",
        stem,
        EXPORT_MARKER,
        date.format("%Y%m%d"),
        XLSX_EXTENSION
    )
}

/// A row below the data region that still belongs to the aggregates: any
/// held-column text, or reason-column text on a row without a case id.
fn is_trailing_aggregate(sheet: &Sheet, row: u32) -> bool {
    if sheet.has_value(row, COL_HELD_YES) || sheet.has_value(row, COL_HELD_NO) {
        return true;
    }
    sheet.text(row, COL_CASE_ID).trim().is_empty()
        && (COL_REASONS_START..=COL_REASONS_END).any(|col| sheet.has_value(row, col))
}

/// Last row holding ledger content: the data rows, then the aggregate rows
/// right after them. Returns the header row for an empty ledger without
/// aggregates.
pub fn content_end(sheet: &Sheet) -> u32 {
    let mut row = HEADER_ROW;
    while !sheet.text(row + 1, COL_CASE_ID).trim().is_empty() {
        row += 1;
    }
    while is_trailing_aggregate(sheet, row + 1) {
        row += 1;
    }
    row
}

/// Write the signature line on the row after [`content_end`] and return it.
///
/// Merged ranges already covering that row are dropped first; the signature
/// merge spans columns A..Q.
pub fn append_signature(sheet: &mut Sheet) -> u32 {
    let row = content_end(sheet) + 1;

    sheet.unmerge_rows(row, row);
    sheet.set_value(row, COL_NUMBER, CellValue::text(SIGNATURE_LABEL));
    for col in COL_NUMBER..=COLUMN_COUNT {
        sheet.set_style(row, col, signature_style(col, COL_NUMBER, COLUMN_COUNT));
    }
    sheet.merge(MergeRange::new(row, COL_NUMBER, row, COLUMN_COUNT));

    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::write_ledger;
    use crate::record::HearingRecord;
    use crate::style::BorderLine;

    fn ledger_with(count: usize) -> Sheet {
        let mut sheet = Sheet::new("Hoja1");
        let records = (0..count)
            .map(|i| HearingRecord {
                case_id: format!("R-{}", i),
                hearing_type: "Otra".to_string(),
                date: "10/10/2024".to_string(),
                time: format!("{:02}:00", 8 + i),
                court: "Juzgado 5".to_string(),
                held: if i % 2 == 0 { "SI" } else { "NO" }.to_string(),
                reasons: Vec::new(),
                notes: String::new(),
            })
            .collect();
        write_ledger(&mut sheet, records).unwrap();
        sheet
    }

    #[test]
    fn export_name_uses_stem_and_compact_date() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 25).unwrap();

        assert_eq!(export_file_name("test.xlsx", date), "test_exportado_20240725.xlsx");
        assert_eq!(export_file_name("caso 7.xlsx", date), "caso 7_exportado_20240725.xlsx");
    }

    #[test]
    fn content_end_covers_data_totals_and_reason_rows() {
        let sheet = ledger_with(3);

        // data 11..=13, totals 14, reasons 15
        assert_eq!(content_end(&sheet), 15);
    }

    #[test]
    fn content_end_of_a_blank_sheet_is_the_header() {
        assert_eq!(content_end(&Sheet::new("Hoja1")), HEADER_ROW);
    }

    #[test]
    fn signature_goes_below_the_aggregates() {
        let mut sheet = ledger_with(2);

        let row = append_signature(&mut sheet);

        assert_eq!(row, 15);
        assert_eq!(sheet.text(15, 1), SIGNATURE_LABEL);
        assert!(sheet.text(14, COL_REASONS_START).starts_with("Juez"));
        assert!(sheet.merges().contains(&MergeRange::new(15, 1, 15, 17)));
        assert_eq!(sheet.cell(15, 1).unwrap().style.border.left.line, BorderLine::Thick);
        assert_eq!(sheet.cell(15, 17).unwrap().style.border.right.line, BorderLine::Thick);
        assert_eq!(sheet.cell(15, 9).unwrap().style.border.left.line, BorderLine::None);
    }

    #[test]
    fn signature_replaces_a_merge_already_on_its_row() {
        let mut sheet = ledger_with(1);
        sheet.merge(MergeRange::new(14, 2, 14, 5));

        let row = append_signature(&mut sheet);

        assert_eq!(row, 14);
        assert_eq!(sheet.merges(), &[MergeRange::new(14, 1, 14, 17)]);
    }
}
