//! Error types for shelftier
//!
//! None of these escape [`MultiLevelCache`](crate::MultiLevelCache)'s public
//! operations: they are logged, counted and turned into a miss or a failed
//! write. Store implementations and internal helpers return them.

use std::io;
use std::time::Duration;

/// Result type alias for L2 store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failure talking to the backing (L2) store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Network or socket error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No reply within the configured timeout
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Malformed or unexpected reply
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The store answered with an error reply
    #[error("server error: {0}")]
    Server(String),

    /// The store is not accepting requests
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failure category, used for counting recovered errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// L2 network, timeout or protocol failure
    BackingStore,
    /// User-supplied fallback returned an error
    Fallback,
    /// An L2 payload could not be encoded or decoded
    Codec,
}

/// Any failure inside the multi-level cache
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Backing store failure
    #[error("backing store: {0}")]
    Store(#[from] StoreError),

    /// Value encoding failure
    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),

    /// Fallback computation failure
    #[error("fallback computation failed: {0:#}")]
    Fallback(anyhow::Error),
}

impl CacheError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CacheError::Store(_) => ErrorKind::BackingStore,
            CacheError::Codec(_) => ErrorKind::Codec,
            CacheError::Fallback(_) => ErrorKind::Fallback,
        }
    }
}

/// Configuration loading failure
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Sources could not be read or deserialized
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),

    /// A value is out of range
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid {
        /// Offending field
        key: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}
