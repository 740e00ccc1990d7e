//! Typed error hierarchy for the relay.
//!
//! Two top-level enums cover the two layers:
//! - `RelayError`: failures of a single correlated round trip (transport,
//!   registry, timeout). `Clone`, because one channel closure fails every
//!   pending waiter with the same error.
//! - `ServiceError`: failures of a task or repository submission, wrapping
//!   `RelayError` plus input problems (missing repository, no sources).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors from the correlation layer and the duplex channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("Failed to connect to {url}: {message}")]
    Connection { url: String, message: String },

    #[error("Failed to send frame: {0}")]
    SendFailure(String),

    #[error("No response for request {id} within {after:?}")]
    Timeout { id: String, after: Duration },

    #[error("Channel closed before a response arrived")]
    ChannelClosed,

    #[error("Correlation id {id} is already pending")]
    DuplicateId { id: String },

    #[error("Backend reported an error: {0}")]
    Backend(String),

    #[error("Request {id} was cancelled")]
    Cancelled { id: String },

    #[error("Failed to encode outbound frame: {0}")]
    Encode(String),
}

impl RelayError {
    /// Short machine-readable name, used in failure annotations and HTTP bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Connection { .. } => "connection_error",
            RelayError::SendFailure(_) => "send_failure",
            RelayError::Timeout { .. } => "timeout",
            RelayError::ChannelClosed => "channel_closed",
            RelayError::DuplicateId { .. } => "duplicate_id",
            RelayError::Backend(_) => "backend_error",
            RelayError::Cancelled { .. } => "cancelled",
            RelayError::Encode(_) => "encode_error",
        }
    }
}

/// Errors from the agent service (single task and repository submissions).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Task description must not be empty")]
    EmptyTask,

    #[error("Repository path {path} does not exist or is not a directory")]
    RepositoryNotFound { path: PathBuf },

    #[error("No .{extension} source files found under {path}")]
    NoSourceFiles { path: PathBuf, extension: String },

    #[error("Failed to read source file {path}: {source}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Source collection task failed: {0}")]
    CollectTask(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Relay(#[from] RelayError),
}
