//! The hearing ledger kept in the data region of a sheet.
//!
//! The data region starts right below the header row and holds one record
//! per row. Every write rebuilds it completely: the records are validated,
//! sorted newest first and written back, followed by two aggregate rows
//! (held/not-held totals and per-reason totals). Rows from
//! [`MAX_ROW`] down belong to whatever the template keeps there and are never
//! touched.

use std::collections::HashSet;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::{LedgerError, Result};
use crate::record::HearingRecord;
use crate::schema::{
    AGGREGATE_PREFIX, COL_CASE_ID, COL_COURT, COL_DATE, COL_HEARING_TYPE, COL_HELD_NO,
    COL_HELD_YES, COL_NOTES, COL_NUMBER, COL_TIME, FIRST_DATA_ROW, HEADER_ROW, HELD_MARKER,
    HELD_NO, HELD_YES, MAX_ROW, REASON_LABELS, REASON_SLOTS, TOTAL_HELD_LABEL,
    TOTAL_NOT_HELD_LABEL, reason_column,
};
use crate::sheet::{CellValue, Sheet};
use crate::style::{RowTemplate, reason_total_style, totals_style};

/// What a ledger write produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    pub records: usize,
    pub held: usize,
    pub not_held: usize,
    /// Per reason slot, how many not-held records name that reason.
    pub reason_totals: [usize; REASON_SLOTS],
    /// Row of the held/not-held totals.
    pub totals_row: u32,
    /// Row of the per-reason totals.
    pub reasons_row: u32,
}

impl LedgerSummary {
    /// Count aggregates over validated records.
    pub fn of(records: &[HearingRecord]) -> Self {
        let mut reason_totals = [0; REASON_SLOTS];
        for record in records.iter().filter(|r| r.held == HELD_NO) {
            for (slot, total) in reason_totals.iter_mut().enumerate() {
                if !record.reason(slot).trim().is_empty() {
                    *total += 1;
                }
            }
        }

        let totals_row = HEADER_ROW + records.len() as u32 + 1;
        LedgerSummary {
            records: records.len(),
            held: records.iter().filter(|r| r.held == HELD_YES).count(),
            not_held: records.iter().filter(|r| r.held == HELD_NO).count(),
            reason_totals,
            totals_row,
            reasons_row: totals_row + 1,
        }
    }
}

/// True when either held column of `row` starts with the aggregate marker.
pub fn is_aggregate_row(sheet: &Sheet, row: u32) -> bool {
    [COL_HELD_YES, COL_HELD_NO]
        .iter()
        .any(|&col| sheet.text(row, col).starts_with(AGGREGATE_PREFIX))
}

/// Read the records of the data region.
///
/// Reading starts on the first data row and stops at the first row whose
/// case id is empty (blank text counts as empty) or at the ceiling. `held` is
/// inferred from which held column carries the marker; it is left empty when
/// neither does.
pub fn read_records(sheet: &Sheet) -> Vec<HearingRecord> {
    let mut records = Vec::new();
    let mut row = FIRST_DATA_ROW;

    while row < MAX_ROW && !sheet.text(row, COL_CASE_ID).trim().is_empty() {
        let held = if sheet.text(row, COL_HELD_YES).trim() == HELD_MARKER {
            HELD_YES
        } else if sheet.text(row, COL_HELD_NO).trim() == HELD_MARKER {
            HELD_NO
        } else {
            ""
        };

        records.push(HearingRecord {
            case_id: sheet.text(row, COL_CASE_ID),
            hearing_type: sheet.text(row, COL_HEARING_TYPE),
            date: sheet.text(row, COL_DATE),
            time: sheet.text(row, COL_TIME),
            court: sheet.text(row, COL_COURT),
            held: held.to_string(),
            reasons: (0..REASON_SLOTS)
                .map(|slot| sheet.text(row, reason_column(slot)))
                .collect(),
            notes: sheet.text(row, COL_NOTES),
        });
        row += 1;
    }

    records
}

/// Validate every record, rejecting duplicate case ids, and pair each with
/// its sort key. Nothing is written when this fails.
fn prepare(records: Vec<HearingRecord>) -> Result<Vec<(NaiveDateTime, HearingRecord)>> {
    let mut seen = HashSet::new();
    let mut prepared = Vec::with_capacity(records.len());

    for mut record in records {
        record.validate()?;
        let instant = record.instant()?;
        if !seen.insert(record.case_key().to_string()) {
            return Err(LedgerError::validation(format!(
                "Ya existe una audiencia con el radicado '{}'.",
                record.case_key()
            )));
        }
        prepared.push((instant, record));
    }

    Ok(prepared)
}

fn check_capacity(count: usize) -> Result<()> {
    let totals_row = HEADER_ROW as usize + count + 1;
    if totals_row > MAX_ROW as usize {
        return Err(LedgerError::CapacityExceeded(
            "Demasiadas audiencias: podrías sobrescribir la firma del defensor.".to_string(),
        ));
    }
    if totals_row + 1 >= MAX_ROW as usize {
        return Err(LedgerError::CapacityExceeded(
            "No hay espacio suficiente para escribir los totales de motivos sin sobrescribir \
             la firma del defensor."
                .to_string(),
        ));
    }
    Ok(())
}

fn write_record(sheet: &mut Sheet, row: u32, number: usize, record: &HearingRecord) {
    sheet.set_value(row, COL_NUMBER, CellValue::Number(number as f64));
    sheet.set_value(row, COL_CASE_ID, CellValue::from_text(&record.case_id));
    sheet.set_value(row, COL_HEARING_TYPE, CellValue::from_text(&record.hearing_type));
    sheet.set_value(row, COL_DATE, CellValue::from_text(&record.date));
    sheet.set_value(row, COL_TIME, CellValue::from_text(&record.time));
    sheet.set_value(row, COL_COURT, CellValue::from_text(&record.court));

    let (yes, no) = if record.is_held() {
        (CellValue::text(HELD_MARKER), CellValue::Empty)
    } else {
        (CellValue::Empty, CellValue::text(HELD_MARKER))
    };
    sheet.set_value(row, COL_HELD_YES, yes);
    sheet.set_value(row, COL_HELD_NO, no);

    for slot in 0..REASON_SLOTS {
        sheet.set_value(row, reason_column(slot), CellValue::from_text(record.reason(slot)));
    }
    sheet.set_value(row, COL_NOTES, CellValue::from_text(&record.notes));
}

/// Remove aggregate rows left directly below the data region.
fn remove_stale_aggregates(sheet: &mut Sheet, first: u32) {
    let mut stale = Vec::new();
    let mut row = first;
    while row < MAX_ROW && is_aggregate_row(sheet, row) {
        stale.push(row);
        row += 1;
    }
    for row in stale.into_iter().rev() {
        sheet.delete_rows(row, 1);
    }
}

fn write_aggregates(sheet: &mut Sheet, summary: &LedgerSummary) {
    let row = summary.totals_row;
    sheet.set_value(
        row,
        COL_HELD_YES,
        CellValue::text(format!("{}: {}", TOTAL_HELD_LABEL, summary.held)),
    );
    sheet.set_value(
        row,
        COL_HELD_NO,
        CellValue::text(format!("{}: {}", TOTAL_NOT_HELD_LABEL, summary.not_held)),
    );
    sheet.set_style(row, COL_HELD_YES, totals_style());
    sheet.set_style(row, COL_HELD_NO, totals_style());

    let row = summary.reasons_row;
    for (slot, total) in summary.reason_totals.iter().enumerate() {
        let col = reason_column(slot);
        sheet.set_value(
            row,
            col,
            CellValue::text(format!("{}: {}", REASON_LABELS[slot], total)),
        );
        sheet.set_style(row, col, reason_total_style());
    }
}

/// Replace the whole data region of `sheet` with `records`.
///
/// All records are validated (including case id uniqueness and date/time
/// parsing) and the capacity is checked before the sheet is touched, so an
/// error leaves it exactly as it was. Records are written newest first;
/// records with the same date and time keep their input order. Every data
/// row takes the look the first data row had before the write.
///
/// # Arguments
/// * `sheet` - Sheet holding the ledger
/// * `records` - The complete new record set
///
/// # Returns
/// * `Result<LedgerSummary>` - Counts and rows of the aggregates written
pub fn write_ledger(sheet: &mut Sheet, records: Vec<HearingRecord>) -> Result<LedgerSummary> {
    let mut prepared = prepare(records)?;
    check_capacity(prepared.len())?;

    let template = if is_aggregate_row(sheet, FIRST_DATA_ROW) {
        RowTemplate::base()
    } else {
        RowTemplate::capture(sheet, FIRST_DATA_ROW)
    };

    let last_writable = MAX_ROW - 1;
    sheet.unmerge_rows(FIRST_DATA_ROW, last_writable);
    sheet.clear_rows(FIRST_DATA_ROW, sheet.max_row().min(last_writable));

    prepared.sort_by(|a, b| b.0.cmp(&a.0));
    let records: Vec<HearingRecord> = prepared.into_iter().map(|(_, record)| record).collect();

    for (i, record) in records.iter().enumerate() {
        let row = FIRST_DATA_ROW + i as u32;
        write_record(sheet, row, i + 1, record);
        template.apply(sheet, row);
    }

    let summary = LedgerSummary::of(&records);
    remove_stale_aggregates(sheet, summary.totals_row);
    write_aggregates(sheet, &summary);

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{Border, BorderLine, CellStyle, base_data_style};

    fn record(case_id: &str, date: &str, time: &str, held: &str) -> HearingRecord {
        HearingRecord {
            case_id: case_id.to_string(),
            hearing_type: "Audiencia preliminar".to_string(),
            date: date.to_string(),
            time: time.to_string(),
            court: "Juzgado 3".to_string(),
            held: held.to_string(),
            reasons: Vec::new(),
            notes: String::new(),
        }
    }

    fn case_ids(sheet: &Sheet) -> Vec<String> {
        read_records(sheet).into_iter().map(|r| r.case_id).collect()
    }

    #[test]
    fn records_are_written_newest_first_with_stable_ties() {
        let mut sheet = Sheet::new("Hoja1");
        let records = vec![
            record("a", "01/01/2024", "09:00", "SI"),
            record("b", "02/01/2024", "09:00", "SI"),
            record("c", "01/01/2024", "09:00", "NO"),
            record("d", "01/01/2024", "08:59", "NO"),
        ];

        write_ledger(&mut sheet, records).unwrap();

        assert_eq!(case_ids(&sheet), vec!["b", "a", "c", "d"]);
        assert_eq!(sheet.text(11, COL_NUMBER), "1");
        assert_eq!(sheet.text(14, COL_NUMBER), "4");
    }

    #[test]
    fn held_marker_lands_in_exactly_one_column() {
        let mut sheet = Sheet::new("Hoja1");

        write_ledger(
            &mut sheet,
            vec![
                record("a", "02/01/2024", "09:00", "si"),
                record("b", "01/01/2024", "09:00", "No"),
            ],
        )
        .unwrap();

        assert_eq!(sheet.text(11, COL_HELD_YES), "X");
        assert!(!sheet.has_value(11, COL_HELD_NO));
        assert!(!sheet.has_value(12, COL_HELD_YES));
        assert_eq!(sheet.text(12, COL_HELD_NO), "X");

        let read = read_records(&sheet);
        assert_eq!(read[0].held, "SI");
        assert_eq!(read[1].held, "NO");
    }

    #[test]
    fn aggregates_follow_the_last_data_row() {
        let mut sheet = Sheet::new("Hoja1");
        let mut not_held = record("b", "01/01/2024", "09:00", "NO");
        not_held.reasons = vec!["".into(), "Fiscal no asistió".into(), "".into(), "Traslado".into()];
        let mut also_not_held = record("c", "01/01/2024", "08:00", "NO");
        also_not_held.reasons = vec!["Juez enfermo".into(), "Fiscal".into()];
        let mut held = record("a", "03/01/2024", "09:00", "SI");
        held.reasons = vec!["ignorado".into()];

        let summary = write_ledger(&mut sheet, vec![not_held, held, also_not_held]).unwrap();

        assert_eq!(summary.held, 1);
        assert_eq!(summary.not_held, 2);
        assert_eq!(summary.reason_totals, [1, 2, 0, 1, 0, 0, 0, 0]);
        assert_eq!(summary.totals_row, 14);
        assert_eq!(sheet.text(14, COL_HELD_YES), "TOTAL DE AUDIENCIAS REALIZADAS: 1");
        assert_eq!(sheet.text(14, COL_HELD_NO), "TOTAL DE AUDIENCIAS NO REALIZADAS: 2");
        assert_eq!(sheet.text(15, reason_column(0)), "Juez: 1");
        assert_eq!(sheet.text(15, reason_column(1)), "Fiscalía: 2");
        assert_eq!(sheet.text(15, reason_column(7)), "Defensor Público: 0");
        assert_eq!(sheet.cell(14, COL_HELD_YES).unwrap().style, totals_style());
        assert_eq!(sheet.cell(15, reason_column(3)).unwrap().style, reason_total_style());
    }

    #[test]
    fn rewriting_with_fewer_records_leaves_no_stale_rows() {
        let mut sheet = Sheet::new("Hoja1");
        let many: Vec<_> = (0..5)
            .map(|i| record(&format!("r{}", i), &format!("0{}/02/2024", i + 1), "10:00", "SI"))
            .collect();
        write_ledger(&mut sheet, many).unwrap();

        let summary =
            write_ledger(&mut sheet, vec![record("solo", "01/03/2024", "10:00", "NO")]).unwrap();

        assert_eq!(case_ids(&sheet), vec!["solo"]);
        assert_eq!(summary.totals_row, 12);
        assert!(sheet.text(12, COL_HELD_YES).starts_with(AGGREGATE_PREFIX));
        assert_eq!(sheet.text(13, reason_column(0)), "Juez: 0");
        assert_eq!(sheet.max_row(), 13);
    }

    #[test]
    fn an_invalid_record_leaves_the_sheet_untouched() {
        let mut sheet = Sheet::new("Hoja1");
        write_ledger(&mut sheet, vec![record("a", "01/01/2024", "09:00", "SI")]).unwrap();
        let before = sheet.clone();

        let err = write_ledger(
            &mut sheet,
            vec![
                record("b", "02/01/2024", "09:00", "SI"),
                record("c", "31/02/2024", "09:00", "SI"),
            ],
        )
        .unwrap_err();

        assert!(matches!(err, LedgerError::Validation(_)));
        assert_eq!(sheet, before);
    }

    #[test]
    fn duplicate_case_ids_in_one_write_are_rejected() {
        let mut sheet = Sheet::new("Hoja1");

        let err = write_ledger(
            &mut sheet,
            vec![
                record("X-1", "02/01/2024", "09:00", "SI"),
                record(" X-1 ", "01/01/2024", "09:00", "NO"),
            ],
        )
        .unwrap_err();

        assert_eq!(err.to_string(), "Ya existe una audiencia con el radicado 'X-1'.");
        assert_eq!(sheet.max_row(), 0);
    }

    #[test]
    fn capacity_is_checked_before_writing() {
        let mut sheet = Sheet::new("Hoja1");
        sheet.set_value(MAX_ROW, 1, CellValue::text("Firma"));
        let before = sheet.clone();
        let too_many: Vec<_> = (0..288)
            .map(|i| record(&format!("r{}", i), "01/01/2024", "10:00", "SI"))
            .collect();

        let err = write_ledger(&mut sheet, too_many).unwrap_err();

        assert!(matches!(err, LedgerError::CapacityExceeded(_)));
        assert_eq!(sheet, before);
    }

    #[test]
    fn the_largest_ledger_that_fits_stops_short_of_the_ceiling() {
        let mut sheet = Sheet::new("Hoja1");
        sheet.set_value(MAX_ROW, 1, CellValue::text("Firma"));
        let records: Vec<_> = (0..287)
            .map(|i| record(&format!("r{}", i), "01/01/2024", "10:00", "SI"))
            .collect();

        let summary = write_ledger(&mut sheet, records).unwrap();

        assert_eq!(summary.reasons_row, MAX_ROW - 1);
        assert_eq!(sheet.text(MAX_ROW, 1), "Firma");
        assert_eq!(read_records(&sheet).len(), 287);
    }

    #[test]
    fn content_at_the_ceiling_never_moves() {
        let mut sheet = Sheet::new("Hoja1");
        sheet.set_value(MAX_ROW, 1, CellValue::text("Firma"));
        sheet.set_value(MAX_ROW + 1, 1, CellValue::text("Pie"));

        write_ledger(&mut sheet, vec![record("a", "01/01/2024", "09:00", "SI")]).unwrap();
        write_ledger(&mut sheet, Vec::new()).unwrap();

        assert_eq!(sheet.text(MAX_ROW, 1), "Firma");
        assert_eq!(sheet.text(MAX_ROW + 1, 1), "Pie");
    }

    #[test]
    fn data_rows_copy_the_first_data_row_look() {
        let mut sheet = Sheet::new("Hoja1");
        let mut look = CellStyle::default();
        look.border = Border::all(BorderLine::Medium);
        for col in 1..=17 {
            sheet.set_style(FIRST_DATA_ROW, col, look.clone());
        }
        sheet.set_row_height(FIRST_DATA_ROW, 27.0);

        write_ledger(
            &mut sheet,
            vec![
                record("a", "02/01/2024", "09:00", "SI"),
                record("b", "01/01/2024", "09:00", "SI"),
            ],
        )
        .unwrap();

        assert_eq!(sheet.cell(12, COL_NOTES).unwrap().style, look);
        assert_eq!(sheet.row_height(12), Some(27.0));
    }

    #[test]
    fn an_empty_ledger_does_not_turn_totals_into_the_row_template() {
        let mut sheet = Sheet::new("Hoja1");
        write_ledger(&mut sheet, Vec::new()).unwrap();
        assert!(is_aggregate_row(&sheet, FIRST_DATA_ROW));

        write_ledger(&mut sheet, vec![record("a", "01/01/2024", "09:00", "SI")]).unwrap();

        assert_eq!(sheet.cell(11, COL_HELD_YES).unwrap().style, base_data_style());
        assert_eq!(sheet.text(12, COL_HELD_YES), "TOTAL DE AUDIENCIAS REALIZADAS: 1");
    }

    #[test]
    fn reasons_beyond_eight_are_dropped() {
        let mut sheet = Sheet::new("Hoja1");
        let mut long = record("a", "01/01/2024", "09:00", "NO");
        long.reasons = (1..=10).map(|i| format!("m{}", i)).collect();

        let summary = write_ledger(&mut sheet, vec![long]).unwrap();

        assert_eq!(sheet.text(11, reason_column(7)), "m8");
        assert_eq!(sheet.text(11, COL_NOTES), "");
        assert_eq!(summary.reason_totals, [1; REASON_SLOTS]);
    }

    #[test]
    fn read_stops_at_the_first_blank_case_id() {
        let mut sheet = Sheet::new("Hoja1");
        sheet.set_value(11, COL_CASE_ID, CellValue::text("a"));
        sheet.set_value(11, COL_HELD_NO, CellValue::text(" X "));
        sheet.set_value(12, COL_CASE_ID, CellValue::text("  "));
        sheet.set_value(13, COL_CASE_ID, CellValue::text("c"));

        let records = read_records(&sheet);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].held, "NO");
        assert_eq!(records[0].reasons.len(), REASON_SLOTS);
    }
}
