use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{LedgerError, Result};
use crate::schema::{HEARING_TYPES, HELD_NO, HELD_YES, REASON_SLOTS};

/// Format the `fecha` and `hora` fields must follow once joined by a space.
pub const DATE_TIME_FORMAT: &str = "%d/%m/%Y %H:%M";

/// One hearing entry, as received from a client or read back from a sheet.
///
/// Field names on the wire are the ones the HTTP clients already send
/// (`radicado`, `tipo_audiencia`, ...); the English names are accepted as
/// aliases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HearingRecord {
    /// Case identifier, unique within a ledger file.
    #[serde(rename = "radicado", alias = "case_id", default, deserialize_with = "lenient_string")]
    pub case_id: String,

    /// One of [`HEARING_TYPES`].
    #[serde(rename = "tipo_audiencia", alias = "hearing_type", default, deserialize_with = "lenient_string")]
    pub hearing_type: String,

    /// `dd/mm/yyyy`, persisted exactly as given.
    #[serde(rename = "fecha", alias = "date", default, deserialize_with = "lenient_string")]
    pub date: String,

    /// `HH:MM`, persisted exactly as given.
    #[serde(rename = "hora", alias = "time", default, deserialize_with = "lenient_string")]
    pub time: String,

    #[serde(rename = "juzgado", alias = "court", default, deserialize_with = "lenient_string")]
    pub court: String,

    /// `SI` or `NO` after validation; any casing before.
    #[serde(rename = "se_realizo", alias = "held", default, deserialize_with = "lenient_string")]
    pub held: String,

    /// Positional reasons, one per reason column. Slots past the eighth are
    /// dropped when the record is written.
    #[serde(rename = "motivos", alias = "reasons", default)]
    pub reasons: Vec<String>,

    #[serde(rename = "observaciones", alias = "notes", default, deserialize_with = "lenient_string")]
    pub notes: String,
}

impl HearingRecord {
    /// Check required fields and enumerated values, normalising in place.
    ///
    /// On success `held` is upper-case canonical (`SI`/`NO`) and
    /// `hearing_type` is trimmed.
    ///
    /// # Returns
    /// * `Result<()>` - `LedgerError::Validation` naming the first bad field
    pub fn validate(&mut self) -> Result<()> {
        let required = [
            ("radicado", &self.case_id),
            ("tipo_audiencia", &self.hearing_type),
            ("fecha", &self.date),
            ("hora", &self.time),
            ("juzgado", &self.court),
            ("se_realizo", &self.held),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(LedgerError::validation(format!(
                    "El campo '{}' es obligatorio.",
                    field
                )));
            }
        }

        let hearing_type = self.hearing_type.trim();
        if !HEARING_TYPES.contains(&hearing_type) {
            return Err(LedgerError::validation(format!(
                "El tipo de audiencia '{}' no es válido. Debe ser uno de los siguientes valores: {}",
                hearing_type,
                HEARING_TYPES.join(", ")
            )));
        }

        let held = self.held.trim().to_uppercase();
        if held != HELD_YES && held != HELD_NO {
            return Err(LedgerError::validation(
                "El campo 'se_realizo' debe ser 'SI' o 'NO'.",
            ));
        }

        self.hearing_type = hearing_type.to_string();
        self.held = held;
        Ok(())
    }

    /// Parse `fecha` + `hora` into the instant used for ordering.
    ///
    /// The parsed value is only a sort key; the original strings are what
    /// gets written back to the sheet.
    pub fn instant(&self) -> Result<NaiveDateTime> {
        let date = self.date.trim();
        let time = self.time.trim();
        if date.is_empty() || time.is_empty() {
            return Err(LedgerError::validation(
                "Los campos 'fecha' y 'hora' son obligatorios.",
            ));
        }

        NaiveDateTime::parse_from_str(&format!("{} {}", date, time), DATE_TIME_FORMAT).map_err(
            |_| {
                LedgerError::validation(format!(
                    "Fecha y hora inválidas: '{} {}'. Formato esperado: dd/mm/yyyy HH:MM",
                    self.date, self.time
                ))
            },
        )
    }

    pub fn is_held(&self) -> bool {
        self.held == HELD_YES
    }

    /// Reason in a zero-based slot, empty when the slot was not supplied.
    pub fn reason(&self, slot: usize) -> &str {
        if slot >= REASON_SLOTS {
            return "";
        }
        self.reasons.get(slot).map(String::as_str).unwrap_or("")
    }

    /// Case id as compared for duplicates.
    pub fn case_key(&self) -> &str {
        self.case_id.trim()
    }
}

/// Accept strings, numbers and booleans for text fields; `null` reads as empty.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    })
}
