use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// Ticket number allocation kept colliding after every retry.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A foreign key (reporter, assignee, ticket...) points at nothing.
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Input rejected before touching the database.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The caller's deadline passed before the transaction could commit.
    #[error("Deadline exceeded, transaction rolled back")]
    DeadlineExceeded,

    /// The blob store refused to persist or remove a file.
    #[error("Document store error: {0}")]
    DocumentStore(String),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Stored JSON content could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Chrono parsing error.
    #[error("Timestamp parse error: {0}")]
    ChronoParse(#[from] chrono::ParseError),
}

impl StoreError {
    /// Map `QueryReturnedNoRows` to [`StoreError::NotFound`], everything else
    /// through the usual conversion.
    pub(crate) fn from_lookup(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            other => classify(other),
        }
    }
}

/// Split constraint violations out of the generic SQLite bucket.
pub(crate) fn classify(e: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(ref err, ref msg) = e {
        if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY {
            return StoreError::InvalidReference(
                msg.clone().unwrap_or_else(|| "foreign key constraint failed".into()),
            );
        }
    }
    StoreError::Sqlite(e)
}

/// True when `e` is a UNIQUE violation, i.e. a ticket number collision.
pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
