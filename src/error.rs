//! Error types for ShardCache
//!
//! Provides a unified error type for all operations, plus the mapping from
//! an error onto the wire-level [`ErrorCode`] a client sees.

use thiserror::Error;

use crate::protocol::ErrorCode;

/// Result type alias using CacheError
pub type Result<T> = std::result::Result<T, CacheError>;

/// Unified error type for ShardCache operations
#[derive(Debug, Error)]
pub enum CacheError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Serialization / Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Action '{0}' is not allowed")]
    Forbidden(String),

    #[error("Action '{0}' is not implemented")]
    NotImplemented(String),

    #[error("Request is missing field '{0}'")]
    MissingField(&'static str),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Routing / Membership Errors
    // -------------------------------------------------------------------------
    #[error("There are no nodes registered")]
    ZeroNodes,

    #[error("Node is not registered")]
    NotRegistered,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    // -------------------------------------------------------------------------
    // Node Communication Errors
    // -------------------------------------------------------------------------
    #[error("Node unreachable at {0}")]
    Unreachable(String),

    #[error("Request to {0} timed out")]
    Timeout(String),

    #[error("Write fan-out failed on {failed} of {total} secondaries")]
    FanOut { failed: usize, total: usize },

    #[error("Remote error {code}: {}", .message.as_deref().unwrap_or("no message"))]
    Remote {
        code: ErrorCode,
        message: Option<String>,
    },
}

impl CacheError {
    /// Wire code reported to the originating client for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            CacheError::Forbidden(_) => ErrorCode::Forbidden,
            CacheError::NotImplemented(_) => ErrorCode::NotImplemented,
            CacheError::ZeroNodes => ErrorCode::ZeroNodes,
            CacheError::NotRegistered => ErrorCode::NotRegistered,
            CacheError::Remote { code, .. } => *code,
            _ => ErrorCode::UnknownError,
        }
    }

    /// Whether the error means the peer could not be reached at all
    pub fn is_unreachable(&self) -> bool {
        matches!(self, CacheError::Unreachable(_))
    }
}

impl From<bincode::Error> for CacheError {
    fn from(e: bincode::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}
