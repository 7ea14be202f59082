/// Error taxonomy for transwarp_db
///
/// Every fallible operation in the crate returns [`Result`]. Driver failures keep
/// their original error as the source so callers see the database's own message.
use std::time::Duration;
use thiserror::Error;

/// Boxed error type used to carry driver errors without tying the API to one driver.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the engine, the scopes and the statement executor.
#[derive(Debug, Error)]
pub enum Error {
    /// The engine is missing, already initialised, or its configuration is invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The connection factory failed to establish a physical connection.
    #[error("connection error: {0}")]
    Connection(#[source] BoxError),

    /// A scalar select returned a row that does not have exactly one column.
    #[error("expected exactly one column, got {0}")]
    MultiColumns(usize),

    /// A scalar select matched no row.
    #[error("scalar select returned no row")]
    EmptyResult,

    /// The driver rejected a statement (syntax error, constraint violation, ...).
    #[error(transparent)]
    Database(BoxError),

    /// The driver call did not finish within the statement timeout.
    #[error("statement timed out after {0:?}")]
    Timeout(Duration),

    /// The SQL text and the bound parameters disagree on the parameter count.
    #[error("statement has {expected} placeholders but {actual} parameters were bound")]
    ParameterCount { expected: usize, actual: usize },

    /// A row has no column with the requested name.
    #[error("no such column: {0}")]
    ColumnNotFound(String),

    /// A typed row accessor found a value of another type.
    #[error("column `{column}` holds {found}, expected {expected}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    /// The thread's execution context holds no connection.
    #[error("no connection is open in this execution context")]
    NotConnected,

    /// The execution context was cleaned up while a transaction was still open.
    #[error("execution context cleaned up with {0} open transaction scope(s)")]
    TransactionOpen(usize),

    /// The outermost commit was refused because an inner scope rolled back.
    #[error("transaction was marked rollback-only by an inner scope and has been rolled back")]
    RolledBack,
}

impl Error {
    /// Wrap a driver error as a [`Error::Database`].
    pub fn database(err: impl Into<BoxError>) -> Self {
        Error::Database(err.into())
    }

    /// Wrap a driver error as a [`Error::Connection`].
    pub fn connection(err: impl Into<BoxError>) -> Self {
        Error::Connection(err.into())
    }

    /// True for errors reported by the database for a statement.
    pub fn is_database(&self) -> bool {
        matches!(self, Error::Database(_))
    }
}

impl From<libsql::Error> for Error {
    fn from(err: libsql::Error) -> Self {
        Error::Database(Box::new(err))
    }
}
