//! Error types for the parameter registry

use shared_types::{ErrorCode, HasErrorCode};
use thiserror::Error;

pub type ParamResult<T> = Result<T, ParamError>;

#[derive(Debug, Error)]
pub enum ParamError {
    #[error("Unknown parameter: {0}")]
    UnknownParam(String),

    #[error("Invalid value {value:?} for parameter {name}: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Parameter blob error: {0}")]
    Blob(#[from] serde_json::Error),

    #[error("Invalid genesis: {0}")]
    Genesis(String),
}

impl HasErrorCode for ParamError {
    fn code(&self) -> ErrorCode {
        match self {
            ParamError::UnknownParam(_) | ParamError::InvalidValue { .. } => {
                ErrorCode::InvalidParameter
            }
            ParamError::Blob(_) => ErrorCode::InvalidEncoding,
            ParamError::Genesis(_) => ErrorCode::Internal,
        }
    }
}
