//! Background rebuilds of the catalog index.

use crate::index::CatalogIndex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Refreshes `index` every `period` until `shutdown` fires.
///
/// The first refresh happens one period after spawning; the index builds
/// itself on first search before that. Failed refreshes are logged and the
/// previous index stays in service.
///
/// # Arguments
///
/// * `index` - Index to refresh
/// * `period` - Time between refreshes
/// * `shutdown` - Stops the loop when cancelled
///
/// # Returns
///
/// Handle of the spawned task; it completes after `shutdown` fires.
pub fn spawn_periodic_refresh(
    index: Arc<CatalogIndex>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        info!(
            "Refreshing catalog index every {}",
            humantime::format_duration(period)
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = index.refresh().await {
                        error!("Scheduled index refresh failed: {}", e);
                    }
                }
            }
        }
        info!("Stopped refreshing catalog index");
    })
}
