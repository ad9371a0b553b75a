// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid run state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
