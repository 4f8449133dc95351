//! Error types for engagement-core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngagementError>;

#[derive(Error, Debug)]
pub enum EngagementError {
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Content not found: {0}")]
    ContentNotFound(String),

    #[error("Authentication required: {0}")]
    Unauthenticated(String),

    #[error("Temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngagementError {
    /// Whether the error is storage contention worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, EngagementError::Unavailable(_))
    }

    /// Classify a Diesel error, keeping SQLite contention retryable
    pub fn from_diesel(context: &str, e: diesel::result::Error) -> Self {
        if let diesel::result::Error::DatabaseError(_, ref info) = e {
            let message = info.message();
            if message.contains("database is locked") || message.contains("database table is locked")
            {
                return EngagementError::Unavailable(format!("{}: {}", context, message));
            }
        }
        EngagementError::Database(format!("{}: {}", context, e))
    }
}

impl From<diesel::result::Error> for EngagementError {
    fn from(e: diesel::result::Error) -> Self {
        EngagementError::from_diesel("Query failed", e)
    }
}
