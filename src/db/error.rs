//! Errors raised by the SQLite score store.

use derive_more::{Display, Error};
use diesel::result::DatabaseErrorKind;
use tracing::instrument;

use crate::error::{BackendError, BackendErrorKind};

/// Score store failure, tagged with where it was raised.
///
/// `conflict` is set when a unique constraint rejected a write, which callers
/// resolving player names treat as "someone else created it first".
#[derive(Debug, Clone, Display, Error)]
#[display("Score store error: {} at {}:{}", message, file, line)]
pub struct DbError {
    /// Error message.
    pub message: String,
    /// A unique constraint rejected the write.
    pub conflict: bool,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl DbError {
    /// Creates an error at the caller's location.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            conflict: false,
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// A game counter that does not fit its INTEGER column.
    #[track_caller]
    pub fn column_range(column: &str, value: u32) -> Self {
        Self::new(format!("{} {} exceeds column range", column, value))
    }

    /// Re-tags this error as a failure of the given collaborator.
    pub fn into_backend(self, kind: BackendErrorKind) -> BackendError {
        BackendError {
            kind,
            message: self.message,
            line: self.line,
            file: self.file,
        }
    }
}

impl From<diesel::result::Error> for DbError {
    #[track_caller]
    fn from(err: diesel::result::Error) -> Self {
        let conflict = matches!(
            err,
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
        );
        let mut error = Self::new(format!("Query failed: {}", err));
        error.conflict = conflict;
        error
    }
}

impl From<diesel::ConnectionError> for DbError {
    #[track_caller]
    fn from(err: diesel::ConnectionError) -> Self {
        Self::new(format!("Cannot open score store: {}", err))
    }
}
