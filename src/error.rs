//! Error types for discord-archiver
//!
//! This module provides the error handling for the library:
//! - [`Error`] is the top-level type returned by fallible operations
//! - [`PlatformError`] classifies chat-platform responses so discovery can
//!   tell recoverable access failures apart from real faults
//! - [`ExportError`] covers partition inspection, reconciliation and the
//!   exporter subprocess

use crate::types::ChannelId;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for discord-archiver operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for discord-archiver
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "token")
        key: Option<String>,
    },

    /// Chat platform request failed
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Export pipeline error (inspection, reconciliation, exporter)
    #[error("export error: {0}")]
    Export(#[from] ExportError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// External tool execution failed (exporter binary missing, spawn failure)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// The platform connection never became ready
    #[error("platform not ready: {0}")]
    NotReady(String),

    /// Shutdown in progress
    #[error("shutdown in progress")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Errors returned by the chat platform
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The account has no access to the object
    #[error("no access to {id}")]
    Forbidden {
        /// The id that was requested
        id: ChannelId,
    },

    /// The object does not exist (deleted or never existed)
    #[error("{id} not found")]
    NotFound {
        /// The id that was requested
        id: ChannelId,
    },

    /// The token was rejected
    #[error("authentication failed: token rejected")]
    Unauthorized,

    /// The platform asked us to slow down
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// How long the platform asked us to wait
        retry_after: Duration,
    },

    /// Any other unexpected HTTP status
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// The response could not be decoded
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Transport-level failure (connect, timeout)
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl PlatformError {
    /// Whether this is a lost-access/deleted response that discovery skips
    pub fn is_access_error(&self) -> bool {
        matches!(
            self,
            PlatformError::Forbidden { .. } | PlatformError::NotFound { .. }
        )
    }
}

/// Export pipeline errors
#[derive(Debug, Error)]
pub enum ExportError {
    /// A partition file could not be read or parsed
    #[error("partition {} is unreadable: {reason}", path.display())]
    PartitionUnreadable {
        /// The partition file
        path: PathBuf,
        /// Why it could not be read
        reason: String,
    },

    /// A partition file has an empty `messages` list
    #[error("partition {} contains no messages", path.display())]
    NoMessages {
        /// The partition file
        path: PathBuf,
    },

    /// Moving a partition into the output directory failed
    #[error("failed to move {} to {}: {reason}", source_path.display(), dest_path.display())]
    MoveFailed {
        /// The scratch file being moved
        source_path: PathBuf,
        /// The canonical destination
        dest_path: PathBuf,
        /// The reason the move failed
        reason: String,
    },

    /// The exporter exited unsuccessfully
    #[error("exporter failed for channel {channel_id} (exit code {code:?})")]
    ExporterFailed {
        /// Channel being exported
        channel_id: ChannelId,
        /// Exit code, `None` if terminated by a signal
        code: Option<i32>,
    },
}
