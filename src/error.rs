//! Error types for network configuration operations

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result alias used throughout the crate
pub type NetResult<T> = Result<T, NetError>;

/// Errors reported by the agent, its collaborators and the Linux platform adapter
#[derive(Error, Debug)]
pub enum NetError {
    /// Generic failure
    #[error("Operation failed: {0}")]
    Fault(String),

    /// Requested item (lease file, lease option, backup) does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Value does not fit the destination
    #[error("Overflow: {0}")]
    Overflow(String),

    /// Caller supplied an invalid address or prefix
    #[error("Bad parameter: {0}")]
    BadParameter(String),

    /// Requested configuration is already in place
    #[error("Duplicate: {0}")]
    Duplicate(String),

    /// Channel technology cannot be handled
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// External command returned a failure status
    #[error("Command failed: {cmd} (exit code {code:?}): {stderr}")]
    CommandFailed {
        cmd: String,
        code: Option<i32>,
        stderr: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Caller-visible result taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCode {
    Ok,
    Fault,
    NotFound,
    Overflow,
    BadParameter,
    Duplicate,
    Unsupported,
}

impl NetError {
    /// Classify this error into the caller-visible taxonomy
    pub fn code(&self) -> ResultCode {
        match self {
            NetError::Fault(_) => ResultCode::Fault,
            NetError::NotFound(_) => ResultCode::NotFound,
            NetError::Overflow(_) => ResultCode::Overflow,
            NetError::BadParameter(_) => ResultCode::BadParameter,
            NetError::Duplicate(_) => ResultCode::Duplicate,
            NetError::Unsupported(_) => ResultCode::Unsupported,
            NetError::CommandFailed { .. } => ResultCode::Fault,
            NetError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ResultCode::NotFound,
            NetError::Io(_) => ResultCode::Fault,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        self.code() == ResultCode::Duplicate
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultCode::Ok => "OK",
            ResultCode::Fault => "FAULT",
            ResultCode::NotFound => "NOT_FOUND",
            ResultCode::Overflow => "OVERFLOW",
            ResultCode::BadParameter => "BAD_PARAMETER",
            ResultCode::Duplicate => "DUPLICATE",
            ResultCode::Unsupported => "UNSUPPORTED",
        };
        f.write_str(name)
    }
}
