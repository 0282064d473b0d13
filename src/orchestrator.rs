//! Transfer orchestration: request, cancel and observe jobs.

use crate::client::{ClientConnector, TransferJob};
use crate::connections::ConnectionRegistry;
use crate::error::TransferError;
use crate::jobs::{JobRegistry, Reservation};
use crate::types::{FileDescriptor, MuleConfig, StatusOption, TransferStatus};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Multiplexes transfer jobs over one shared connection per network.
///
/// Cheap to clone; clones share the same registries.
#[derive(Clone)]
pub struct TransferOrchestrator {
    connections: ConnectionRegistry,
    jobs: JobRegistry,
}

impl TransferOrchestrator {
    pub fn new(config: &MuleConfig, connector: Arc<dyn ClientConnector>) -> Self {
        Self {
            connections: ConnectionRegistry::new(config, connector),
            jobs: JobRegistry::new(),
        }
    }

    /// Starts transferring `descriptor`, unless a job for it is already in flight.
    ///
    /// Waits for the network's connection to become ready, asks the bot for
    /// the pack and publishes a `pending` status. Progress is then tracked in
    /// the background until the job ends.
    ///
    /// # Arguments
    ///
    /// * `descriptor` - The file to fetch; every identity field must be set
    ///
    /// # Returns
    ///
    /// `Ok(())` once the transfer is accepted or was already running, or the
    /// connection or client error that prevented it from starting.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use xdcc_mule::{ClientConnector, FileDescriptor, MuleConfig, TransferOrchestrator};
    ///
    /// # async fn example(connector: Arc<dyn ClientConnector>) -> Result<(), Box<dyn std::error::Error>> {
    /// let orchestrator = TransferOrchestrator::new(&MuleConfig::default(), connector);
    /// orchestrator
    ///     .request_transfer(FileDescriptor {
    ///         network: "irc.example.net".to_string(),
    ///         channel_name: "#chan".to_string(),
    ///         bot_name: "Bot".to_string(),
    ///         file_number: "#12".to_string(),
    ///         file_name: "file.mkv".to_string(),
    ///         file_size: "1.2G".to_string(),
    ///     })
    ///     .await?;
    /// let statuses = orchestrator.list_statuses(None).await;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn request_transfer(&self, descriptor: FileDescriptor) -> Result<(), TransferError> {
        descriptor.validate()?;
        let key = descriptor.key();

        let Some(reservation) = self.jobs.reserve(&key).await else {
            debug!("Transfer {} already in flight", key);
            return Ok(());
        };

        let job = match self.start(&reservation, &descriptor).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                info!("Transfer {} cancelled before it started", key);
                self.jobs.release(&key, reservation.epoch).await;
                return Ok(());
            }
            Err(e) => {
                warn!("Transfer {} could not start: {}", key, e);
                self.jobs.release(&key, reservation.epoch).await;
                return Err(e);
            }
        };

        if self.jobs.open_status(&reservation, descriptor.clone()).await {
            info!("Transfer {} accepted", key);
        }
        tokio::spawn(self.jobs.clone().follow(
            key,
            reservation.epoch,
            descriptor.file_name,
            job.events,
        ));
        Ok(())
    }

    // `None` when the caller cancelled while the connection was coming up.
    async fn start(
        &self,
        reservation: &Reservation,
        descriptor: &FileDescriptor,
    ) -> Result<Option<TransferJob>, TransferError> {
        let connection = self
            .connections
            .acquire(&descriptor.network, &descriptor.channel_name)
            .await;

        tokio::select! {
            ready = connection.ready() => ready?,
            _ = reservation.cancel.cancelled() => return Ok(None),
        }

        let job = connection
            .client()
            .begin_transfer(
                &descriptor.bot_name,
                &descriptor.file_number,
                reservation.cancel.clone(),
            )
            .await?;
        Ok(Some(job))
    }

    /// Cancels the job for `descriptor`, if any, and forgets its status.
    ///
    /// Cancelling an unknown file is not an error. Returns whether a live job
    /// was signalled.
    pub async fn cancel_transfer(&self, descriptor: &FileDescriptor) -> bool {
        let key = descriptor.key();
        let signalled = self.jobs.cancel(&key).await;
        if signalled {
            info!("Cancelling transfer {}", key);
        }
        signalled
    }

    /// Snapshot of every status entry, optionally only those with `filter`.
    pub async fn list_statuses(&self, filter: Option<StatusOption>) -> Vec<TransferStatus> {
        self.jobs.snapshot(filter).await
    }

    pub async fn status(&self, descriptor: &FileDescriptor) -> Option<TransferStatus> {
        self.jobs.status(&descriptor.key()).await
    }

    /// Drops finished entries (downloaded, failed or cancelled).
    pub async fn clear_finished(&self) -> usize {
        let cleared = self.jobs.clear_finished().await;
        debug!("Cleared {} finished transfer(s)", cleared);
        cleared
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }
}
