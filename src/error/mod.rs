use thiserror::Error;

/// Top-level errors for the learning engine
#[derive(Debug, Error)]
pub enum LearningError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid experience: {message}")]
    InvalidExperience { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Serialization failed: {message}")]
    Serialization { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Result type alias for learning engine operations
pub type LearningResult<T> = Result<T, LearningError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
