//! The transfer client capability consumed by the orchestrator.
//!
//! The IRC handshake and DCC negotiation live behind these traits. One
//! [`TransferClient`] serves one network; everything it reports flows back
//! as events over channels handed out when the connection or job is created.

use crate::error::TransferError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Settings for opening a connection to one IRC network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub network: String,
    pub port: u16,
    /// Channels joined right after registration.
    pub channels: Vec<String>,
    pub nickname: String,
    pub randomize_nick: bool,
    /// Directory transfers are written into.
    pub download_path: PathBuf,
}

/// Connection-level signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Registered and joined; transfers may start.
    Ready,
    /// Fatal connection problem.
    Error(String),
    /// No transfers left on this connection; it may be closed.
    IdleCloseable,
}

/// Signals emitted for one transfer.
///
/// A connection may interleave events for several files, so the
/// file-carrying variants name the file they concern.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Progress {
        file_name: String,
        bytes_received: u64,
        percentage: f64,
        /// Seconds remaining, if the client can estimate it.
        eta: Option<u64>,
    },
    Completed {
        file_name: String,
    },
    Error {
        message: String,
        /// `None` when the error is not tied to a particular file.
        file_name: Option<String>,
    },
    Cancelled,
    Finished,
}

impl JobEvent {
    /// Whether this event applies to the transfer of `file_name`.
    pub fn concerns(&self, file_name: &str) -> bool {
        match self {
            JobEvent::Progress { file_name: f, .. } | JobEvent::Completed { file_name: f } => {
                f == file_name
            }
            JobEvent::Error {
                file_name: Some(f), ..
            } => f == file_name,
            JobEvent::Error { file_name: None, .. } | JobEvent::Cancelled | JobEvent::Finished => {
                true
            }
        }
    }

    /// Terminal events end the job; only progress keeps it alive.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::Progress { .. })
    }
}

/// An accepted transfer and its event subscription.
///
/// Dropping the sender side without a terminal event is read as
/// [`JobEvent::Finished`].
#[derive(Debug)]
pub struct TransferJob {
    pub events: mpsc::UnboundedReceiver<JobEvent>,
}

/// A connection being established and its event subscription.
pub struct Connecting {
    pub client: Arc<dyn TransferClient>,
    pub events: mpsc::UnboundedReceiver<ConnectionEvent>,
}

/// A live connection to one IRC network.
#[async_trait]
pub trait TransferClient: Send + Sync {
    /// Asks `bot_name` for pack `file_number`.
    ///
    /// The client aborts the transfer, best effort, once `cancel` fires.
    async fn begin_transfer(
        &self,
        bot_name: &str,
        file_number: &str,
        cancel: CancellationToken,
    ) -> Result<TransferJob, TransferError>;

    /// Disconnects from the network.
    async fn close(&self);
}

/// Opens connections. Implemented by the IRC/XDCC client.
pub trait ClientConnector: Send + Sync {
    fn connect(&self, options: ConnectOptions) -> Connecting;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_scoped_by_file_name() {
        let progress = JobEvent::Progress {
            file_name: "a.mkv".to_string(),
            bytes_received: 10,
            percentage: 1.0,
            eta: None,
        };
        assert!(progress.concerns("a.mkv"));
        assert!(!progress.concerns("b.mkv"));

        let unscoped = JobEvent::Error {
            message: "boom".to_string(),
            file_name: None,
        };
        assert!(unscoped.concerns("b.mkv"));
        assert!(JobEvent::Cancelled.concerns("b.mkv"));
    }

    #[test]
    fn test_only_progress_is_non_terminal() {
        let progress = JobEvent::Progress {
            file_name: "a.mkv".to_string(),
            bytes_received: 10,
            percentage: 1.0,
            eta: None,
        };
        assert!(!progress.is_terminal());
        assert!(JobEvent::Finished.is_terminal());
        assert!(JobEvent::Completed {
            file_name: "a.mkv".to_string()
        }
        .is_terminal());
    }
}
