/*!
# Audiencias

Hearing record ledgers kept in formatted xlsx workbooks, with a small HTTP API.

## Overview

A public defender's office keeps one workbook per ledger. Each workbook is a
copy of a formatted base template: a title block, a header row, and below it
one row per hearing. The crate validates incoming hearings, rewrites the data
region of a ledger sorted newest first, keeps two aggregate rows (held/not-held
totals and per-reason totals) right below the data, and produces signed export
copies for printing.

## Sheet Layout

- Header captions on row 10, data from row 11
- Rows from 300 down are never written by the ledger
- Columns A..Q: number, case id, hearing type, date, time, court, held (SI/NO
  markers in G/H), eight reason columns (I..P) and notes (Q)

## Modules

- **schema**: Fixed row/column layout and controlled vocabularies
- **record**: Hearing record type and validation
- **sheet**: In-memory worksheet grid (values, styles, merges, sizes)
- **style**: Cell style descriptors and the ledger styling rules
- **xlsx_styles**: Formatting parts of an xlsx package (styles, sizes, merges)
- **xlsx**: Loading and atomically saving workbooks
- **xlsx_patch**: In-place row updates of an existing workbook package
- **ledger**: Reading records and rebuilding the data region
- **export**: Signature row for export copies
- **template**: Default base template
- **store**: Ledger files on disk (create, list, append, export, download)
- **config**: Command-line and environment configuration
- **app**: HTTP routing (feature `web`)

## REST API Endpoints

- `POST /crear_archivo/?nombre=...` - Create a ledger from the base template
- `POST /audiencias/` - Append one hearing to a ledger
- `GET /audiencias/{nombre}` - Records of a ledger
- `GET /archivos/` - List ledgers
- `POST /exportar/{nombre}` - Write a signed export copy
- `GET /descargar/{nombre}` - Download a ledger or export
*/

pub mod config;
pub mod error;
pub mod export;
pub mod ledger;
pub mod record;
pub mod schema;
pub mod sheet;
pub mod store;
pub mod style;
pub mod template;
pub mod xlsx;
pub mod xlsx_patch;
pub mod xlsx_styles;

#[cfg(feature = "web")]
pub mod app;

pub use config::Config;
pub use error::{LedgerError, Result};
pub use ledger::LedgerSummary;
pub use record::HearingRecord;
pub use sheet::{CellValue, Sheet};
pub use store::LedgerStore;
