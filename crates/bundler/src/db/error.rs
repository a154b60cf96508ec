//! Database error types.

use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors from database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating the database directory.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// An update targeted a row that does not exist.
    #[error("No {table} row for {key}")]
    NotFound { table: &'static str, key: String },

    /// No database path was configured and no home directory was found.
    #[error("No database path configured and no home directory to default to")]
    NoPath,

    /// The connection lock was poisoned by a panicking holder.
    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl DatabaseError {
    /// True when the database could not be reached or locked, as opposed to
    /// rejecting the statement or its data.
    pub fn is_unavailable(&self) -> bool {
        match self {
            DatabaseError::LockPoisoned | DatabaseError::Io { .. } => true,
            DatabaseError::Sqlite(e) => matches!(
                e.sqlite_error_code(),
                Some(
                    ErrorCode::DatabaseBusy
                        | ErrorCode::DatabaseLocked
                        | ErrorCode::CannotOpen
                        | ErrorCode::SystemIoFailure
                )
            ),
            DatabaseError::Migration { .. }
            | DatabaseError::NotFound { .. }
            | DatabaseError::NoPath => false,
        }
    }
}
