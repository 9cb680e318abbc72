use thiserror::Error;

/// Errors surfaced by ledger operations.
///
/// Every variant except [`LedgerError::Workbook`] and [`LedgerError::Io`] is a
/// client error: the request was rejected before anything was persisted.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The ledger file or the base template does not exist.
    #[error("{0}")]
    NotFound(String),

    /// A record or request failed validation.
    #[error("{0}")]
    Validation(String),

    /// The write would reach the reserved rows at the bottom of the sheet.
    #[error("{0}")]
    CapacityExceeded(String),

    /// The destination of a create-from-template already exists.
    #[error("{0}")]
    Conflict(String),

    /// The workbook could not be read or written.
    #[error("Error al procesar el libro de Excel: {0}")]
    Workbook(String),

    #[error("Error de E/S: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }

    /// True for the error kinds that are the caller's fault.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, LedgerError::Workbook(_) | LedgerError::Io(_))
    }
}

impl From<rust_xlsxwriter::XlsxError> for LedgerError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        LedgerError::Workbook(e.to_string())
    }
}

impl From<calamine::XlsxError> for LedgerError {
    fn from(e: calamine::XlsxError) -> Self {
        LedgerError::Workbook(e.to_string())
    }
}

impl From<quick_xml::Error> for LedgerError {
    fn from(e: quick_xml::Error) -> Self {
        LedgerError::Workbook(e.to_string())
    }
}

impl From<zip::result::ZipError> for LedgerError {
    fn from(e: zip::result::ZipError) -> Self {
        LedgerError::Workbook(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
