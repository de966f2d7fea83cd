use crate::FetchMode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Raised by SQLite itself and passed through untouched.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("Unsupported fetch mode {0}")]
    UnsupportedFetchMode(FetchMode),

    #[error("Column {index} is out of range, the result has {count} column(s)")]
    ColumnOutOfRange { index: usize, count: usize },

    #[error("Statement must be executed before fetching")]
    NotExecuted,

    #[error("Statement has no operation named '{0}'")]
    UnknownOperation(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No records found")]
    RecordsNotFound,

    #[error("{0} records were found")]
    MultipleRecordsFound(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
