//! In-flight jobs and the status store polled by callers.
//!
//! Two maps keyed by [`JobKey`]:
//!
//! - `jobs` holds one slot per transfer that is starting or running. A key
//!   with a slot cannot be requested again until the slot is released.
//! - `statuses` holds what callers see. Entries outlive their jobs and are
//!   removed only by cancellation or [`JobRegistry::clear_finished`].
//!
//! Every reservation gets a fresh epoch. Status writes carry the epoch of
//! the job that produced them and are dropped if the entry was removed or
//! replaced in the meantime, so a late event can never bring back a
//! cancelled entry.

use crate::client::JobEvent;
use crate::types::{FileDescriptor, JobKey, StatusOption, TransferStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Exclusive right to run a job for one key.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub key: JobKey,
    pub epoch: u64,
    /// Fired when the caller cancels; handed to the transfer client.
    pub cancel: CancellationToken,
}

struct JobSlot {
    epoch: u64,
    cancel: CancellationToken,
}

struct StatusSlot {
    epoch: u64,
    status: TransferStatus,
}

#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<JobKey, JobSlot>>>,
    statuses: Arc<RwLock<HashMap<JobKey, StatusSlot>>>,
    next_epoch: Arc<AtomicU64>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `key` for a new job. `None` if a job for it is already in flight.
    pub async fn reserve(&self, key: &JobKey) -> Option<Reservation> {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(key) {
            return None;
        }
        let epoch = self.next_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        jobs.insert(
            key.clone(),
            JobSlot {
                epoch,
                cancel: cancel.clone(),
            },
        );
        Some(Reservation {
            key: key.clone(),
            epoch,
            cancel,
        })
    }

    /// Frees the job slot for `key` if it still belongs to `epoch`.
    pub async fn release(&self, key: &JobKey, epoch: u64) -> bool {
        let mut jobs = self.jobs.lock().await;
        if jobs.get(key).is_some_and(|slot| slot.epoch == epoch) {
            jobs.remove(key);
            true
        } else {
            false
        }
    }

    /// Publishes a pending status for an accepted job.
    ///
    /// Skipped if the job was cancelled while it was starting.
    pub async fn open_status(&self, reservation: &Reservation, file: FileDescriptor) -> bool {
        let mut statuses = self.statuses.write().await;
        if reservation.cancel.is_cancelled() {
            return false;
        }
        statuses.insert(
            reservation.key.clone(),
            StatusSlot {
                epoch: reservation.epoch,
                status: TransferStatus::pending(file),
            },
        );
        true
    }

    /// Applies `event` to the status of `key`, if it is still owned by `epoch`.
    pub async fn record(&self, key: &JobKey, epoch: u64, event: &JobEvent) {
        let mut statuses = self.statuses.write().await;
        match statuses.get_mut(key) {
            Some(slot) if slot.epoch == epoch => slot.status.apply(event),
            _ => debug!("Dropping event for retired status {}", key),
        }
    }

    /// Signals the job for `key`, if any, and removes its status entry.
    ///
    /// Returns whether a live job was signalled.
    pub async fn cancel(&self, key: &JobKey) -> bool {
        let signalled = match self.jobs.lock().await.get(key) {
            Some(slot) => {
                slot.cancel.cancel();
                true
            }
            None => false,
        };
        self.statuses.write().await.remove(key);
        signalled
    }

    /// Whether a job for `key` is starting or running.
    pub async fn is_active(&self, key: &JobKey) -> bool {
        self.jobs.lock().await.contains_key(key)
    }

    pub async fn active_count(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn status(&self, key: &JobKey) -> Option<TransferStatus> {
        self.statuses
            .read()
            .await
            .get(key)
            .map(|slot| slot.status.clone())
    }

    /// Copies every status entry, optionally keeping only one status.
    pub async fn snapshot(&self, filter: Option<StatusOption>) -> Vec<TransferStatus> {
        self.statuses
            .read()
            .await
            .values()
            .filter(|slot| filter.map_or(true, |wanted| slot.status.status == wanted))
            .map(|slot| slot.status.clone())
            .collect()
    }

    /// Drops every status entry in a terminal state. Returns how many went.
    pub async fn clear_finished(&self) -> usize {
        let mut statuses = self.statuses.write().await;
        let before = statuses.len();
        statuses.retain(|_, slot| !slot.status.status.is_terminal());
        before - statuses.len()
    }

    /// Feeds a job's events into its status until a terminal event or the
    /// end of the stream, then frees the job slot.
    pub(crate) async fn follow(
        self,
        key: JobKey,
        epoch: u64,
        file_name: String,
        mut events: mpsc::UnboundedReceiver<JobEvent>,
    ) {
        while let Some(event) = events.recv().await {
            if !event.concerns(&file_name) {
                debug!("Ignoring event for another file on {}: {:?}", key, event);
                continue;
            }
            self.record(&key, epoch, &event).await;
            if !event.is_terminal() {
                continue;
            }

            match &event {
                JobEvent::Progress { .. } => {}
                JobEvent::Completed { .. } => info!("Transfer of {} completed", file_name),
                JobEvent::Error { message, .. } => {
                    warn!("Transfer of {} failed: {}", file_name, message)
                }
                JobEvent::Cancelled => info!("Transfer of {} cancelled", file_name),
                JobEvent::Finished => debug!("Transfer of {} finished", file_name),
            }
            break;
        }
        self.release(&key, epoch).await;
    }
}
