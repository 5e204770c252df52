use std::fmt::{Display, Formatter};

use crate::util::CodecError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatabaseErrorCode {
    InvalidArgument,
    Internal,
    PermissionDenied,
    NotInitialized,
    Disabled,
    Offline,
    VersionMismatch,
    TransactionAborted,
    MaxRetries,
}

impl DatabaseErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseErrorCode::InvalidArgument => "database/invalid-argument",
            DatabaseErrorCode::Internal => "database/internal",
            DatabaseErrorCode::PermissionDenied => "database/permission-denied",
            DatabaseErrorCode::NotInitialized => "database/not-initialized",
            DatabaseErrorCode::Disabled => "database/disabled",
            DatabaseErrorCode::Offline => "database/offline",
            DatabaseErrorCode::VersionMismatch => "database/version-mismatch",
            DatabaseErrorCode::TransactionAborted => "database/transaction-aborted",
            DatabaseErrorCode::MaxRetries => "database/max-retries",
        }
    }
}

#[derive(Clone, Debug)]
pub struct DatabaseError {
    pub code: DatabaseErrorCode,
    message: String,
}

impl DatabaseError {
    pub fn new(code: DatabaseErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    /// The message without the code suffix, as reported to hosts.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for DatabaseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl std::error::Error for DatabaseError {}

impl From<CodecError> for DatabaseError {
    fn from(err: CodecError) -> Self {
        invalid_argument(err.to_string())
    }
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

pub fn invalid_argument(message: impl Into<String>) -> DatabaseError {
    DatabaseError::new(DatabaseErrorCode::InvalidArgument, message)
}

pub fn internal_error(message: impl Into<String>) -> DatabaseError {
    DatabaseError::new(DatabaseErrorCode::Internal, message)
}

pub fn permission_denied(message: impl Into<String>) -> DatabaseError {
    DatabaseError::new(DatabaseErrorCode::PermissionDenied, message)
}

pub fn not_initialized() -> DatabaseError {
    DatabaseError::new(DatabaseErrorCode::NotInitialized, "Firebase not initialized")
}

pub fn disabled() -> DatabaseError {
    DatabaseError::new(DatabaseErrorCode::Disabled, "Realtime Database is not enabled")
}

pub fn offline() -> DatabaseError {
    DatabaseError::new(DatabaseErrorCode::Offline, "Database is offline")
}

pub fn version_mismatch(message: impl Into<String>) -> DatabaseError {
    DatabaseError::new(DatabaseErrorCode::VersionMismatch, message)
}
