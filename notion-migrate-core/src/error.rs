//! Error types shared by the migration engine.
//!
//! Errors are grouped by where they can be recovered:
//! - [`RemoteError`]: a call against the document API failed (transport, status, size).
//! - [`AssetError`]: an attachment could not be rehomed to durable storage.
//! - [`ParseError`]: the markdown parser rejected a document.
//! - [`MigrateError`]: the run-level taxonomy the [`crate::policy::FailurePolicy`]
//!   maps onto "recover", "skip" or "halt".

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single remote document-API call. Surfaced unmodified by the
/// destination client; retrying is left to the caller.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("remote returned {status} ({code}): {message}")]
    Status {
        status: u16,
        code: String,
        message: String,
    },

    #[error("batch of {size} blocks exceeds the limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Whether the call can be repeated without risking a duplicate write.
    ///
    /// Only failures where the remote never applied the request qualify: the
    /// connection was never established, or the remote answered 429 or 409.
    /// Timeouts and 5xx answers may follow a write that did happen, so they
    /// are not retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Transport(e) => e.is_connect(),
            RemoteError::Status { status, .. } => matches!(*status, 409 | 429),
            RemoteError::BatchTooLarge { .. } | RemoteError::Decode(_) => false,
        }
    }
}

/// Failure to turn a local attachment into a durable URL.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset {path} is not readable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("asset store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("asset store rejected {key} with status {status}")]
    Rejected { key: String, status: u16 },

    #[error("asset {url} does not exist in the origin bucket")]
    Missing { url: String },

    #[error("asset rehoming is disabled")]
    Disabled,

    #[error("asset store misconfigured: {0}")]
    Config(String),

    #[error("signing the upload failed: {0}")]
    Signing(String),
}

#[derive(Debug, Error)]
#[error("markdown parse failed: {0}")]
pub struct ParseError(pub String);

/// Run-level error taxonomy.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("failed to transform {path}: {source}")]
    Transform {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error("failed to rehome asset referenced from {document}: {source}")]
    Asset {
        document: PathBuf,
        #[source]
        source: AssetError,
    },

    #[error("{operation} on {destination_id} failed: {source}")]
    RemoteWrite {
        operation: &'static str,
        destination_id: String,
        #[source]
        source: RemoteError,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
