//! Error types for catalog and transfer operations.

use thiserror::Error;

/// Errors that can occur while fetching or indexing catalog documents.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// HTTP transport error while fetching a document.
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    /// The server answered, but not with a success status.
    #[error("Fetching {url} failed: HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// A listing fetch task panicked or was aborted.
    #[error("Listing task failed: {0}")]
    TaskFailed(String),
}

/// Errors that reject a transfer request.
///
/// Failures that happen after a transfer was accepted are never returned
/// through this type; they land on the transfer's status entry instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// A required descriptor field was empty.
    #[error("Invalid file descriptor: {0} must not be empty")]
    InvalidDescriptor(&'static str),

    /// The network connection reported an error before it became ready.
    #[error("Connection to {network} failed: {message}")]
    ConnectionFailed { network: String, message: String },

    /// The network connection went away before it became ready.
    #[error("Connection to {0} closed before it became ready")]
    ConnectionClosed(String),

    /// The transfer client refused to start the transfer.
    #[error("Transfer rejected by {bot}: {message}")]
    Rejected { bot: String, message: String },
}
