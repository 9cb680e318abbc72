//! Default base template.
//!
//! Deployments normally ship their own formatted template. This one has the
//! same fixed layout (title, header captions on the header row, a styled
//! first data row) so a fresh install can create ledgers straight away.

use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::schema::{COL_NUMBER, COLUMN_COUNT, FIRST_DATA_ROW, HEADER_LABELS, HEADER_ROW};
use crate::sheet::{CellValue, MergeRange, Sheet};
use crate::style::{
    AlignmentStyle, Border, BorderLine, CellStyle, FillStyle, FontStyle, RowTemplate, Rgb,
};
use crate::xlsx;

pub const TEMPLATE_SHEET_NAME: &str = "Audiencias";
pub const TEMPLATE_TITLE: &str = "REGISTRO DE AUDIENCIAS";

const HEADER_FILL: Rgb = Rgb(0xBDD7EE);
const HEADER_ROW_HEIGHT: f64 = 32.0;

/// Column widths A..Q, in characters.
const COLUMN_WIDTHS: [f64; COLUMN_COUNT as usize] = [
    6.0, 18.0, 32.0, 12.0, 8.0, 24.0, 12.0, 12.0, 12.0, 12.0, 12.0, 12.0, 12.0, 12.0, 14.0, 14.0,
    32.0,
];

fn title_style() -> CellStyle {
    CellStyle {
        font: FontStyle {
            name: Some("Calibri".to_string()),
            size: Some(14.0),
            bold: true,
            ..FontStyle::default()
        },
        alignment: AlignmentStyle::centered(false),
        ..CellStyle::default()
    }
}

fn header_style() -> CellStyle {
    CellStyle {
        font: FontStyle {
            name: Some("Calibri".to_string()),
            size: Some(11.0),
            bold: true,
            ..FontStyle::default()
        },
        fill: FillStyle::solid(HEADER_FILL),
        border: Border::all(BorderLine::Thin),
        alignment: AlignmentStyle::centered(true),
        number_format: None,
    }
}

/// Build the default template sheet.
pub fn default_template() -> Sheet {
    let mut sheet = Sheet::new(TEMPLATE_SHEET_NAME);

    sheet.set_value(1, COL_NUMBER, CellValue::text(TEMPLATE_TITLE));
    sheet.set_style(1, COL_NUMBER, title_style());
    sheet.merge(MergeRange::new(1, COL_NUMBER, 1, COLUMN_COUNT));

    for (i, label) in HEADER_LABELS.iter().enumerate() {
        let col = COL_NUMBER + i as u16;
        sheet.set_value(HEADER_ROW, col, CellValue::text(*label));
        sheet.set_style(HEADER_ROW, col, header_style());
        sheet.set_column_width(col, COLUMN_WIDTHS[i]);
    }
    sheet.set_row_height(HEADER_ROW, HEADER_ROW_HEIGHT);

    RowTemplate::base().apply(&mut sheet, FIRST_DATA_ROW);
    sheet
}

/// Write the default template to `path` unless a file is already there.
///
/// # Returns
/// * `Result<bool>` - `true` when the template was written, `false` when an
///   existing file was left alone
pub fn write_default_template(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    xlsx::save(&default_template(), path)?;
    log::info!("default template written to {}", path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::read_records;
    use crate::style::base_data_style;
    use tempfile::tempdir;

    #[test]
    fn template_has_headers_and_a_styled_empty_first_row() {
        let sheet = default_template();

        assert_eq!(sheet.text(HEADER_ROW, 2), "Radicado");
        assert_eq!(sheet.text(HEADER_ROW, COLUMN_COUNT), "Observaciones");
        assert!(!sheet.has_value(FIRST_DATA_ROW, 2));
        assert_eq!(sheet.cell(FIRST_DATA_ROW, 5).unwrap().style, base_data_style());
        assert!(read_records(&sheet).is_empty());
    }

    #[test]
    fn write_creates_parent_dirs_and_never_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Plantillas").join("plantilla_base");

        assert!(write_default_template(&path).unwrap());
        let first = fs::read(&path).unwrap();
        assert!(!write_default_template(&path).unwrap());

        assert_eq!(fs::read(&path).unwrap(), first);
        let loaded = xlsx::load(&path).unwrap();
        assert_eq!(loaded.text(1, 1), TEMPLATE_TITLE);
        assert_eq!(loaded.text(HEADER_ROW, 3), "Tipo de audiencia");
    }
}
