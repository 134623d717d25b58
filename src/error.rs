//! Error types for mdtasks
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad args, unknown task or column)
//! - 3: Conflict (column collision, protected/non-empty column, test gate)
//! - 4: Operation failed (I/O, git, serialization)

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the mdtasks CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const CONFLICT: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A task id or column slug that does not exist.
    NotFound,
    /// A user-correctable validation failure against current state.
    Conflict,
    /// Malformed input or configuration.
    Invalid,
    /// I/O, subprocess or serialization failure.
    Failed,
}

/// Main error type for mdtasks operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Conflicts (exit code 3)
    #[error("Column conflict: {0}")]
    ColumnConflict(String),

    #[error("Task {id} requires passing tests before it can move to '{column}'")]
    TestsRequired { id: String, column: String },

    // Operation failures (exit code 4)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),

    #[error("Task store is closed")]
    StoreClosed,

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TaskNotFound(_) | Error::ColumnNotFound(_) => ErrorKind::NotFound,
            Error::ColumnConflict(_) | Error::TestsRequired { .. } => ErrorKind::Conflict,
            Error::InvalidArgument(_) | Error::InvalidConfig(_) => ErrorKind::Invalid,
            Error::Io(_)
            | Error::Json(_)
            | Error::Yaml(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::Pattern(_)
            | Error::Git(_)
            | Error::Watch(_)
            | Error::LockFailed(_)
            | Error::StoreClosed
            | Error::OperationFailed(_) => ErrorKind::Failed,
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::NotFound | ErrorKind::Invalid => exit_codes::USER_ERROR,
            ErrorKind::Conflict => exit_codes::CONFLICT,
            ErrorKind::Failed => exit_codes::OPERATION_FAILED,
        }
    }

    /// Structured fields for JSON error output, where the variant carries any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::TaskNotFound(id) => Some(serde_json::json!({ "id": id })),
            Error::ColumnNotFound(slug) => Some(serde_json::json!({ "column": slug })),
            Error::TestsRequired { id, column } => {
                Some(serde_json::json!({ "id": id, "column": column }))
            }
            Error::InvalidConfig(message) | Error::ColumnConflict(message) => {
                Some(serde_json::json!({ "message": message }))
            }
            _ => None,
        }
    }
}

/// Result type alias for mdtasks operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            error: err.to_string(),
            code: err.exit_code(),
            details: err.details(),
        }
    }
}
