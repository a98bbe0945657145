//! Reply definitions
//!
//! Represents replies from the broker and from nodes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::Snapshot;
use crate::error::{CacheError, Result};

/// Error codes carried by `Reply::Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    Forbidden,
    NotImplemented,
    ZeroNodes,
    NotRegistered,
    UnknownError,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotImplemented => "NOT_IMPLEMENTED",
            ErrorCode::ZeroNodes => "ZERO_NODES",
            ErrorCode::NotRegistered => "NOT_REGISTERED",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reply message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    /// Registration accepted; `snapshot` is `None` for the first member
    Registered {
        node: usize,
        snapshot: Option<Snapshot>,
    },

    Unregistered,

    Pong,

    /// Result of a get; `None` is the absent marker
    Value(Option<Vec<u8>>),

    /// Acknowledges a set
    Stored,

    /// Acknowledges a remove; carries whether the key existed
    Removed(bool),

    Snapshot(Snapshot),

    Error {
        code: ErrorCode,
        message: Option<String>,
    },
}

impl Reply {
    /// Create an error reply
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Reply::Error {
            code,
            message: Some(message.into()),
        }
    }

    /// Convert a local error into the reply a client should see
    pub fn from_error(err: &CacheError) -> Self {
        Self::error(err.code(), err.to_string())
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Reply::Error { .. })
    }

    /// Turn an error reply into `CacheError::Remote`
    pub fn into_result(self) -> Result<Reply> {
        match self {
            Reply::Error { code, message } => Err(CacheError::Remote { code, message }),
            reply => Ok(reply),
        }
    }
}
