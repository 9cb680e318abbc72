//! Ledger files on disk.
//!
//! A [`LedgerStore`] owns a directory of ledger workbooks and the path of the
//! base template they are created from. Every operation loads the target file,
//! does its work and saves before returning; nothing is cached between calls.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use log::{info, warn};

use crate::error::{LedgerError, Result};
use crate::export::{append_signature, export_file_name};
use crate::ledger::{LedgerSummary, read_records, write_ledger};
use crate::record::HearingRecord;
use crate::schema::{FIRST_DATA_ROW, MAX_ROW, XLSX_EXTENSION};
use crate::xlsx;

/// Rows a ledger write may touch: the data region and its aggregate rows.
const LEDGER_ROWS: std::ops::RangeInclusive<u32> = FIRST_DATA_ROW..=MAX_ROW - 1;

/// Normalise a client-supplied ledger name: trimmed, `.xlsx` appended when
/// missing, and never able to leave the files directory.
pub fn normalize_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::validation(
            "El nombre del archivo es obligatorio.",
        ));
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(LedgerError::validation(format!(
            "Nombre de archivo inválido: '{}'.",
            name
        )));
    }

    let suffix = format!(".{}", XLSX_EXTENSION);
    if name.ends_with(&suffix) {
        Ok(name.to_string())
    } else {
        Ok(format!("{}{}", name, suffix))
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if let (Ok(a), Ok(b)) = (fs::canonicalize(a), fs::canonicalize(b)) {
        return a == b;
    }
    matches!(
        (std::path::absolute(a), std::path::absolute(b)),
        (Ok(a), Ok(b)) if a == b
    )
}

#[derive(Debug, Clone)]
pub struct LedgerStore {
    files_dir: PathBuf,
    template: PathBuf,
}

impl LedgerStore {
    pub fn new(files_dir: impl Into<PathBuf>, template: impl Into<PathBuf>) -> Self {
        LedgerStore {
            files_dir: files_dir.into(),
            template: template.into(),
        }
    }

    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    pub fn template(&self) -> &Path {
        &self.template
    }

    /// Refuse any write whose target is the base template itself.
    fn guard_template(&self, path: &Path) -> Result<()> {
        if same_file(path, &self.template) {
            warn!("write to the base template refused: {}", path.display());
            return Err(LedgerError::validation(
                "No se puede modificar la plantilla base directamente. \
                 Cree una copia de trabajo con 'crear_archivo'.",
            ));
        }
        Ok(())
    }

    /// Normalised name and path of a ledger that must already exist.
    fn existing(&self, name: &str) -> Result<(String, PathBuf)> {
        let name = normalize_name(name)?;
        let path = self.files_dir.join(&name);
        if !path.is_file() {
            return Err(LedgerError::NotFound(format!(
                "El archivo '{}' no existe.",
                name
            )));
        }
        Ok((name, path))
    }

    /// Create a new ledger by copying the base template.
    ///
    /// # Arguments
    /// * `name` - Ledger name; `.xlsx` is appended when missing
    ///
    /// # Returns
    /// * `Result<PathBuf>` - Path of the new ledger. `NotFound` when the template
    ///   is missing, `Conflict` when a ledger of that name exists
    pub fn create_from_template(&self, name: &str) -> Result<PathBuf> {
        if !self.template.is_file() {
            return Err(LedgerError::NotFound(format!(
                "No se encontró la plantilla base en '{}'",
                self.template.display()
            )));
        }

        let name = normalize_name(name)?;
        let dest = self.files_dir.join(&name);
        if dest.exists() {
            warn!("ledger '{}' already exists", name);
            return Err(LedgerError::Conflict(format!(
                "Ya existe un archivo con el nombre '{}'. Elija otro nombre.",
                name
            )));
        }
        self.guard_template(&dest)?;

        fs::create_dir_all(&self.files_dir)?;
        fs::copy(&self.template, &dest)?;
        info!("ledger '{}' created from {}", name, self.template.display());
        Ok(dest)
    }

    /// Names of the `.xlsx` files in the files directory, sorted. A missing
    /// directory lists as empty.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.files_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let suffix = format!(".{}", XLSX_EXTENSION);
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(&suffix) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn read_all(&self, name: &str) -> Result<Vec<HearingRecord>> {
        let (_, path) = self.existing(name)?;
        let sheet = xlsx::load(&path)?;
        Ok(read_records(&sheet))
    }

    /// Replace every record of a ledger and rewrite its aggregates.
    ///
    /// Nothing is saved if any record is invalid or the set does not fit.
    pub fn replace_all(&self, name: &str, records: Vec<HearingRecord>) -> Result<LedgerSummary> {
        let (name, path) = self.existing(name)?;
        self.guard_template(&path)?;

        let mut sheet = xlsx::load(&path)?;
        let summary = write_ledger(&mut sheet, records).inspect_err(|e| {
            warn!("records for '{}' rejected: {}", name, e);
        })?;
        xlsx::update(&sheet, &path, &path, LEDGER_ROWS)?;

        info!(
            "'{}' saved with {} records ({} held, {} not held)",
            name, summary.records, summary.held, summary.not_held
        );
        Ok(summary)
    }

    /// Add one record to a ledger.
    ///
    /// The record's case id must not already be in the ledger. The existing
    /// records and the new one are then written back as a whole.
    ///
    /// # Returns
    /// * `Result<LedgerSummary>` - `summary.records` is the new record count
    pub fn append_one(&self, name: &str, record: HearingRecord) -> Result<LedgerSummary> {
        let (name, path) = self.existing(name)?;
        self.guard_template(&path)?;

        let mut sheet = xlsx::load(&path)?;
        let mut records = read_records(&sheet);

        let key = record.case_key();
        if records.iter().any(|existing| existing.case_key() == key) {
            warn!("duplicate case id '{}' for '{}'", key, name);
            return Err(LedgerError::validation(format!(
                "Ya existe una audiencia con el radicado '{}'.",
                key
            )));
        }
        records.push(record);

        let summary = write_ledger(&mut sheet, records).inspect_err(|e| {
            warn!("record for '{}' rejected: {}", name, e);
        })?;
        xlsx::update(&sheet, &path, &path, LEDGER_ROWS)?;

        info!("record added to '{}', {} records now", name, summary.records);
        Ok(summary)
    }

    /// Export a signed copy of a ledger dated today. See [`LedgerStore::export_on`].
    pub fn export(&self, name: &str) -> Result<String> {
        self.export_on(name, Local::now().date_naive())
    }

    /// Write `<stem>_exportado_<YYYYMMDD>.xlsx` next to the ledger: a copy
    /// with the signature line appended. The ledger itself is not modified.
    ///
    /// # Returns
    /// * `Result<String>` - File name of the export
    pub fn export_on(&self, name: &str, date: NaiveDate) -> Result<String> {
        let name = normalize_name(name)?;
        let source = self.files_dir.join(&name);
        if !source.is_file() {
            return Err(LedgerError::NotFound(format!(
                "No se encontró el archivo '{}'",
                name
            )));
        }

        let exported = export_file_name(&name, date);
        let dest = self.files_dir.join(&exported);
        self.guard_template(&dest)?;

        let signed = xlsx::load(&source).and_then(|mut sheet| {
            let row = append_signature(&mut sheet);
            xlsx::update(&sheet, &source, &dest, row..=row).map(|_| row)
        });
        match signed {
            Ok(row) => {
                info!("'{}' exported to '{}' (signature on row {})", name, exported, row);
                Ok(exported)
            }
            Err(e) => {
                warn!("export of '{}' failed: {}", name, e);
                Err(e)
            }
        }
    }

    /// Path of an existing file in the files directory, for downloading.
    pub fn download_path(&self, name: &str) -> Result<PathBuf> {
        self.existing(name).map(|(_, path)| path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::write_default_template;
    use tempfile::{TempDir, tempdir};

    fn store() -> (TempDir, LedgerStore) {
        let dir = tempdir().unwrap();
        let template = dir.path().join("Plantillas").join("plantilla_base");
        write_default_template(&template).unwrap();
        let store = LedgerStore::new(dir.path().join("archivos"), template);
        (dir, store)
    }

    fn hearing(case_id: &str) -> HearingRecord {
        HearingRecord {
            case_id: case_id.to_string(),
            hearing_type: "Audiencia de conciliación".to_string(),
            date: "25/07/2024".to_string(),
            time: "10:00".to_string(),
            court: "Juzgado 1".to_string(),
            held: "si".to_string(),
            reasons: vec!["Acuerdo".to_string()],
            notes: "ok".to_string(),
        }
    }

    #[test]
    fn names_get_the_extension_and_stay_inside_the_directory() {
        assert_eq!(normalize_name("test").unwrap(), "test.xlsx");
        assert_eq!(normalize_name(" test.xlsx ").unwrap(), "test.xlsx");
        assert!(matches!(normalize_name("../x"), Err(LedgerError::Validation(_))));
        assert!(matches!(normalize_name("a/b"), Err(LedgerError::Validation(_))));
        assert!(matches!(normalize_name("a\\b"), Err(LedgerError::Validation(_))));
        assert!(matches!(normalize_name("  "), Err(LedgerError::Validation(_))));
    }

    #[test]
    fn create_copies_the_template_once() {
        let (_dir, store) = store();

        let path = store.create_from_template("test").unwrap();

        assert_eq!(path, store.files_dir().join("test.xlsx"));
        assert_eq!(fs::read(&path).unwrap(), fs::read(store.template()).unwrap());
        let err = store.create_from_template("test.xlsx").unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
        assert_eq!(
            err.to_string(),
            "Ya existe un archivo con el nombre 'test.xlsx'. Elija otro nombre."
        );
    }

    #[test]
    fn create_without_template_is_not_found() {
        let dir = tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("archivos"), dir.path().join("nada"));

        let err = store.create_from_template("x").unwrap_err();

        assert!(matches!(err, LedgerError::NotFound(_)));
        assert!(err.to_string().starts_with("No se encontró la plantilla base en"));
    }

    #[test]
    fn list_only_returns_workbooks_sorted() {
        let (_dir, store) = store();
        assert!(store.list().unwrap().is_empty());

        store.create_from_template("b").unwrap();
        store.create_from_template("a").unwrap();
        fs::write(store.files_dir().join("notas.txt"), "x").unwrap();
        fs::create_dir(store.files_dir().join("carpeta.xlsx")).unwrap();

        assert_eq!(store.list().unwrap(), vec!["a.xlsx", "b.xlsx"]);
    }

    #[test]
    fn operations_on_a_missing_ledger_are_not_found() {
        let (_dir, store) = store();

        assert!(matches!(store.read_all("nada"), Err(LedgerError::NotFound(_))));
        assert!(matches!(
            store.append_one("nada", hearing("1")),
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(store.export("nada"), Err(LedgerError::NotFound(_))));
        assert!(matches!(store.download_path("nada"), Err(LedgerError::NotFound(_))));
    }

    #[test]
    fn append_then_read_back() {
        let (_dir, store) = store();
        store.create_from_template("test").unwrap();

        let summary = store.append_one("test", hearing("12345-ABC")).unwrap();
        let records = store.read_all("test.xlsx").unwrap();

        assert_eq!(summary.records, 1);
        assert_eq!(summary.held, 1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].case_id, "12345-ABC");
        assert_eq!(records[0].held, "SI");
        assert_eq!(records[0].reasons[0], "Acuerdo");
    }

    #[test]
    fn duplicate_append_leaves_the_file_unchanged() {
        let (_dir, store) = store();
        let path = store.create_from_template("test").unwrap();
        store.append_one("test", hearing("12345-ABC")).unwrap();
        let before = fs::read(&path).unwrap();

        let err = store.append_one("test", hearing(" 12345-ABC ")).unwrap_err();

        assert_eq!(
            err.to_string(),
            "Ya existe una audiencia con el radicado '12345-ABC'."
        );
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn the_template_is_never_a_write_target() {
        let dir = tempdir().unwrap();
        let files = dir.path().join("archivos");
        let template = files.join("base.xlsx");
        write_default_template(&template).unwrap();
        let store = LedgerStore::new(&files, &template);
        let before = fs::read(&template).unwrap();

        let err = store.append_one("base", hearing("1")).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        let err = store.replace_all("base.xlsx", Vec::new()).unwrap_err();
        assert!(err.to_string().starts_with("No se puede modificar la plantilla base"));

        assert_eq!(fs::read(&template).unwrap(), before);
    }

    #[test]
    fn export_leaves_the_source_alone() {
        let (_dir, store) = store();
        let path = store.create_from_template("test").unwrap();
        store.append_one("test", hearing("1")).unwrap();
        let before = fs::read(&path).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 7, 25).unwrap();

        let exported = store.export_on("test", date).unwrap();

        assert_eq!(exported, "test_exportado_20240725.xlsx");
        assert_eq!(fs::read(&path).unwrap(), before);
        let copy = xlsx::load(&store.download_path(&exported).unwrap()).unwrap();
        assert_eq!(copy.text(14, 1), crate::schema::SIGNATURE_LABEL);
    }

    #[test]
    fn failed_export_removes_the_copy() {
        let (_dir, store) = store();
        fs::create_dir_all(store.files_dir()).unwrap();
        fs::write(store.files_dir().join("roto.xlsx"), b"no es un libro").unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

        let err = store.export_on("roto", date).unwrap_err();

        assert!(matches!(err, LedgerError::Workbook(_)));
        assert!(!store.files_dir().join("roto_exportado_20240102.xlsx").exists());
    }
}
