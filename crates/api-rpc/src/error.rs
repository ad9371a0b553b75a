//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error codes.

use jsonrpsee::types::ErrorObjectOwned;
use netops_core::domain::DomainError;
use netops_core::error::AppError;

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const CONFLICT: i32 = 4002;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const DB_ERROR: i32 = 5001;
    pub const SYSTEM_ERROR: i32 = 5002;
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    let code = match &err {
        AppError::Validation(_) | AppError::Serialization(_) => code::VALIDATION_ERROR,
        AppError::NotFound(_) => code::NOT_FOUND,
        AppError::Conflict(_) => code::CONFLICT,
        AppError::Database(_) => code::DB_ERROR,
        AppError::Io(_) | AppError::Driver(_) => code::SYSTEM_ERROR,
        AppError::Internal(_) => code::INTERNAL_ERROR,
        AppError::Domain(e) => match e {
            DomainError::InvalidSchedule(_) | DomainError::ValidationError(_) => {
                code::VALIDATION_ERROR
            }
            DomainError::InvalidStateTransition { .. } => code::CONFLICT,
        },
    };
    ErrorObjectOwned::owned(code, err.to_string(), None::<()>)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let cases = [
            (AppError::Validation("bad".into()), code::VALIDATION_ERROR),
            (
                AppError::Domain(DomainError::InvalidSchedule("x".into())),
                code::VALIDATION_ERROR,
            ),
            (AppError::NotFound("job 1".into()), code::NOT_FOUND),
            (AppError::Conflict("running".into()), code::CONFLICT),
            (AppError::Database("locked".into()), code::DB_ERROR),
            (AppError::Internal("boom".into()), code::INTERNAL_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(to_rpc_error(err).code(), expected);
        }
    }

    #[test]
    fn test_message_is_kept() {
        let err = to_rpc_error(AppError::Conflict("run r1 is still running".into()));
        assert!(err.message().contains("run r1 is still running"));
    }
}
