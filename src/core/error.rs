use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Persistence registry is already initialized")]
    AlreadyInitialized,

    #[error("Persistence registry is not initialized")]
    NotInitialized,

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Entity type '{0}' is not registered")]
    UnknownEntity(String),

    #[error("No row in '{0}' with key '{1}'")]
    NotFound(String, String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl DbError {
    /// A rejected write: nothing was persisted and the caller may correct
    /// the input and retry.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::ConstraintViolation(_) | Self::TypeMismatch(_) | Self::InvalidIdentifier(_)
        )
    }

    /// Errors after which the process cannot serve requests.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigError(_)
                | Self::StorageUnavailable(_)
                | Self::AlreadyInitialized
                | Self::NotInitialized
        )
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
