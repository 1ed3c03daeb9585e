use crate::model::{FieldViolation, Status};
use thiserror::Error;

/// Every failure the workflow surfaces to a caller.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed")]
    Validation(Vec<FieldViolation>),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("submission {id} is already {status}")]
    AlreadyDecided { id: i64, status: Status },
    #[error("operation not permitted")]
    Forbidden,
    #[error("authentication required")]
    Unauthenticated,
    #[error("identity assertion expired")]
    ExpiredAssertion,
    #[error("identity assertion invalid")]
    InvalidAssertion,
    #[error("{0} is already registered")]
    DuplicateKey(&'static str),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("attachment of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("storage failure")]
    Storage(#[source] anyhow::Error),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::AlreadyDecided { .. } => "already_decided",
            Self::Forbidden => "forbidden",
            Self::Unauthenticated | Self::ExpiredAssertion | Self::InvalidAssertion => {
                "unauthenticated"
            }
            Self::DuplicateKey(_) => "duplicate_key",
            Self::InvalidCredentials => "invalid_credentials",
            Self::UnsupportedMediaType(_) => "unsupported_media_type",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::Storage(_) => "storage_failure",
        }
    }

    /// Caller-facing message. Token problems collapse into one message and
    /// storage detail never leaves the process.
    pub fn public_message(&self) -> String {
        match self {
            Self::Unauthenticated | Self::ExpiredAssertion | Self::InvalidAssertion => {
                Self::Unauthenticated.to_string()
            }
            Self::Storage(_) => "internal storage error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.into())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        Self::Storage(e)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(e.into())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.into())
    }
}

pub type AppResult<T> = Result<T, AppError>;
