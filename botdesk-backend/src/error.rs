//! Error taxonomy shared by the store, the tenancy guard and the services.
//!
//! Messages never carry internal identifiers: they are safe to hand to the
//! presentation layer as-is, although it usually shows a generic message.

use thiserror::Error;

/// Coarse classification used by callers (and the HTTP adapter) to decide
/// how to react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    Conflict,
    Unavailable,
}

#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity absent or owned by another tenant. The two cases are
    /// deliberately indistinguishable.
    #[error("Resource not found")]
    NotFound,

    #[error("Event references an unknown agent")]
    UnknownAgent,

    #[error("Event references an unknown conversation")]
    UnknownConversation,

    #[error("Unsupported platform: {0}")]
    InvalidPlatform(String),

    #[error("Unsupported message role: {0}")]
    InvalidRole(String),

    #[error("Unknown time zone: {0}")]
    InvalidTimeZone(String),

    #[error("Agent name must not be empty")]
    InvalidName,

    #[error("A file is required")]
    InvalidFile,

    #[error("Cannot change status from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error("Timestamp out of range")]
    InvalidTimestamp,

    #[error("Invalid date range")]
    InvalidRange,

    #[error("Counters must not be negative")]
    NegativeCounter,

    #[error("Resource already exists")]
    Conflict,

    #[error("Storage unavailable")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound | CoreError::UnknownAgent | CoreError::UnknownConversation => {
                ErrorKind::NotFound
            }
            CoreError::InvalidPlatform(_)
            | CoreError::InvalidRole(_)
            | CoreError::InvalidTimeZone(_)
            | CoreError::InvalidName
            | CoreError::InvalidFile
            | CoreError::InvalidTransition { .. }
            | CoreError::InvalidTimestamp
            | CoreError::InvalidRange
            | CoreError::NegativeCounter => ErrorKind::InvalidInput,
            CoreError::Conflict => ErrorKind::Conflict,
            CoreError::Unavailable(_) => ErrorKind::Unavailable,
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation
                    && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY) =>
            {
                CoreError::Conflict
            }
            _ => CoreError::Unavailable(Box::new(err)),
        }
    }
}

impl From<r2d2::Error> for CoreError {
    fn from(err: r2d2::Error) -> Self {
        CoreError::Unavailable(Box::new(err))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
