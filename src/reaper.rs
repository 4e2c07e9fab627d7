//! Background sweep: the only thing that enforces TTLs without a request.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::blob::BlobStore;
use crate::store::RoomStore;

/// Runs `store.sweep` on a fixed interval for the life of the process,
/// purging the blobs of expired file messages as it goes. Blob deletion is
/// spawned fire-and-forget so a slow disk never delays the next sweep.
pub fn spawn(
    store: Arc<RoomStore>,
    blobs: Arc<dyn BlobStore>,
    interval: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tick.tick().await;

            let now = OffsetDateTime::now_utc();
            let purged = store.sweep(now);
            if !purged.is_empty() {
                tracing::debug!(count = purged.len(), "sweep released expired blobs");
            }
            for blob in purged {
                let blobs = blobs.clone();
                tokio::spawn(async move {
                    if let Err(err) = blobs.delete(&blob).await {
                        tracing::warn!(%blob, error = %err, "failed to delete expired blob");
                    }
                });
            }
        }
    })
}
