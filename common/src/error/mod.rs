//! Error types for the live plot feed
//!
//! This module provides a unified error handling system for the decoder, the
//! feed and the producer. Connection-level failures, per-frame decode failures
//! and export failures each have their own variant so callers can tell a
//! retryable `start()` failure from a dropped frame.

use std::fmt::Display;
use std::time::Duration;

use thiserror::Error;

/// Why an outbound connection attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectFailure {
    /// Host name could not be resolved
    #[error("name resolution failed: {0}")]
    Resolve(String),

    /// Peer actively refused the connection
    #[error("connection refused")]
    Refused,

    /// Connect did not complete within the configured timeout
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Any other socket-level failure
    #[error("{0}")]
    Other(String),
}

/// Live plot feed error type
#[derive(Debug, Error)]
pub enum Error {
    /// Opening the stream connection failed; recoverable by retrying `start()`
    #[error("Failed to connect to {addr}: {reason}")]
    Connect {
        /// Address that was dialled
        addr: String,
        /// Failure reason
        reason: ConnectFailure,
    },

    /// A single corrupt frame; the stream itself is still usable
    #[error("Framing error: {0}")]
    Framing(String),

    /// Too many bytes buffered without completing a frame
    #[error("Frame too large: {buffered} bytes buffered without a complete frame (limit {limit})")]
    FrameTooLarge {
        /// Bytes held when the limit was hit
        buffered: usize,
        /// Configured limit
        limit: usize,
    },

    /// Serializing or writing an export failed
    #[error("Export error: {0}")]
    Export(String),

    /// `start()` was called while a session is still active
    #[error("Feed is already streaming")]
    AlreadyStreaming,

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Whether the error only affected a single frame and the stream may continue
    pub fn is_frame_level(&self) -> bool {
        matches!(self, Error::Framing(_) | Error::FrameTooLarge { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait to add context to error results
pub trait ErrorExt<T> {
    /// Add context information to an error
    fn with_context<C, F>(self, context_fn: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display;
}

impl<T> ErrorExt<T> for Result<T> {
    fn with_context<C, F>(self, context_fn: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display,
    {
        self.map_err(|e| {
            let context = context_fn().to_string();
            match e {
                Error::Framing(msg) => Error::Framing(format!("{}: {}", context, msg)),
                Error::Export(msg) => Error::Export(format!("{}: {}", context, msg)),
                Error::ConfigurationError(msg) => Error::ConfigurationError(format!("{}: {}", context, msg)),
                Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), format!("{}: {}", context, e))),
                other => other,
            }
        })
    }
}
