// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Driver error: {0}")]
    Driver(#[from] crate::port::DriverError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// True for errors the caller caused (bad input), as opposed to system faults
    pub fn is_validation(&self) -> bool {
        use crate::domain::DomainError;

        matches!(
            self,
            AppError::Validation(_)
                | AppError::Domain(DomainError::InvalidSchedule(_))
                | AppError::Domain(DomainError::ValidationError(_))
        )
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// Note: sqlx::Error conversion is handled in infra-sqlite crate
// by converting to AppError::Database(String)
