//! Errors surfaced by classification, deletion and stats operations

use crate::grid::GridError;

#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("Invalid grid: {0}")]
    InvalidGrid(#[from] GridError),

    #[error("No classification record for key: {0}")]
    NotFound(String),

    #[error("Record store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store answered but rejected the operation
    #[error("Record store fault: {0}")]
    StoreFault(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl DetectorError {
    /// Only backend outages are worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, DetectorError::StoreUnavailable(_))
    }
}

impl From<rusqlite::Error> for DetectorError {
    fn from(e: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        let transient = match &e {
            rusqlite::Error::SqliteFailure(err, _) => matches!(
                err.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::CannotOpen
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::DiskFull
                    | ErrorCode::OutOfMemory
                    | ErrorCode::FileLockingProtocolFailed
            ),
            _ => false,
        };
        if transient {
            DetectorError::StoreUnavailable(format!("SQLite: {}", e))
        } else {
            DetectorError::StoreFault(format!("SQLite: {}", e))
        }
    }
}

impl From<std::io::Error> for DetectorError {
    fn from(e: std::io::Error) -> Self {
        DetectorError::StoreUnavailable(format!("I/O: {}", e))
    }
}

impl From<serde_json::Error> for DetectorError {
    fn from(e: serde_json::Error) -> Self {
        DetectorError::StoreUnavailable(format!("JSON: {}", e))
    }
}
