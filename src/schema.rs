//! Fixed layout of a ledger worksheet.
//!
//! Rows and columns are 1-based, the same way they read in a spreadsheet
//! application (`A1` is row 1, column 1).

/// Row holding the column captions. Data starts on the row below.
pub const HEADER_ROW: u32 = 10;

/// First row that data and aggregate writers must never touch.
pub const MAX_ROW: u32 = 300;

/// First data row; also the row whose styling every data row copies.
pub const FIRST_DATA_ROW: u32 = HEADER_ROW + 1;

pub const COL_NUMBER: u16 = 1; // A
pub const COL_CASE_ID: u16 = 2; // B
pub const COL_HEARING_TYPE: u16 = 3; // C
pub const COL_DATE: u16 = 4; // D
pub const COL_TIME: u16 = 5; // E
pub const COL_COURT: u16 = 6; // F
pub const COL_HELD_YES: u16 = 7; // G
pub const COL_HELD_NO: u16 = 8; // H
pub const COL_REASONS_START: u16 = 9; // I
pub const COL_REASONS_END: u16 = 16; // P
pub const COL_NOTES: u16 = 17; // Q

/// Number of columns in the fixed schema (A..Q).
pub const COLUMN_COUNT: u16 = COL_NOTES;

/// Number of positional reason slots.
pub const REASON_SLOTS: usize = (COL_REASONS_END - COL_REASONS_START + 1) as usize;

/// Marker written into exactly one of the two held columns.
pub const HELD_MARKER: &str = "X";

/// Canonical held values.
pub const HELD_YES: &str = "SI";
pub const HELD_NO: &str = "NO";

/// Text prefix that identifies an aggregate row in the held columns.
pub const AGGREGATE_PREFIX: &str = "TOTAL DE";

pub const TOTAL_HELD_LABEL: &str = "TOTAL DE AUDIENCIAS REALIZADAS";
pub const TOTAL_NOT_HELD_LABEL: &str = "TOTAL DE AUDIENCIAS NO REALIZADAS";

/// Text placed in the merged signature row of an exported copy.
pub const SIGNATURE_LABEL: &str = "Firma del defensor público:__________________________";

/// Suffix inserted between a ledger stem and the export date.
pub const EXPORT_MARKER: &str = "_exportado_";

pub const XLSX_EXTENSION: &str = "xlsx";

/// Reason category for each reason column, in column order I..P.
pub const REASON_LABELS: [&str; REASON_SLOTS] = [
    "Juez",
    "Fiscalía",
    "Usuario",
    "Inpec",
    "Víctima",
    "ICBF",
    "Defensor Confianza",
    "Defensor Público",
];

/// Controlled vocabulary for the hearing type column.
pub const HEARING_TYPES: [&str; 18] = [
    "Alegatos de conclusión",
    "Audiencia concentrada",
    "Audiencia de acusación",
    "Audiencia de conciliación",
    "Audiencia de control de legalidad",
    "Audiencia de individualización de pena",
    "Audiencia de imputación",
    "Audiencia de incidente de reparación integral",
    "Audiencia de juicio oral",
    "Audiencia de medidas de aseguramiento",
    "Audiencia de nulidad",
    "Audiencia de preclusión",
    "Audiencia de prórroga",
    "Audiencia de revisión de medida",
    "Audiencia de verificación de cumplimiento",
    "Audiencia preliminar",
    "Audiencia preparatoria",
    "Otra",
];

/// Column captions written on the header row of a generated template.
pub const HEADER_LABELS: [&str; COLUMN_COUNT as usize] = [
    "No.",
    "Radicado",
    "Tipo de audiencia",
    "Fecha",
    "Hora",
    "Juzgado",
    "Realizada SI",
    "Realizada NO",
    "Juez",
    "Fiscalía",
    "Usuario",
    "Inpec",
    "Víctima",
    "ICBF",
    "Defensor Confianza",
    "Defensor Público",
    "Observaciones",
];

/// Reason column for a zero-based reason slot.
pub fn reason_column(slot: usize) -> u16 {
    COL_REASONS_START + slot as u16
}

/// Convert a 1-based column number to its letter (1 = A, 27 = AA).
pub fn column_letter(col: u16) -> String {
    let mut name = String::new();
    let mut n = col;

    while n > 0 {
        n -= 1;
        name.insert(0, (b'A' + (n % 26) as u8) as char);
        n /= 26;
    }

    name
}

/// Cell name such as `G12` for a 1-based row and column.
pub fn cell_name(row: u32, col: u16) -> String {
    format!("{}{}", column_letter(col), row)
}

/// Parse a cell name such as `B5` into a 1-based (row, col) pair.
pub fn parse_cell_name(name: &str) -> Option<(u32, u16)> {
    let mut letters = String::new();
    let mut digits = String::new();

    for c in name.chars() {
        if c == '$' {
            continue;
        }
        if c.is_ascii_alphabetic() {
            if !digits.is_empty() {
                return None;
            }
            letters.push(c.to_ascii_uppercase());
        } else if c.is_ascii_digit() {
            digits.push(c);
        } else {
            return None;
        }
    }

    if letters.is_empty() || digits.is_empty() {
        return None;
    }

    let col = letters
        .chars()
        .try_fold(0u32, |acc, c| acc.checked_mul(26)?.checked_add(c as u32 - 'A' as u32 + 1))?;
    let row: u32 = digits.parse().ok()?;
    if row == 0 || col == 0 || col > u16::MAX as u32 {
        return None;
    }

    Some((row, col as u16))
}
