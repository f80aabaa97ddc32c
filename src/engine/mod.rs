mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use availability::{compute_slots, free_gaps, group_by_window, WindowSlots};
pub use conflict::{find_conflict, has_conflict};
pub use error::{EngineError, ErrorKind};
pub use store::{InMemoryStore, SharedFacility, SharedPartition};

use std::io;
use std::path::Path;

use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::model::*;
use crate::observability;
use crate::wal::Wal;

// ── Group-commit journal channel ─────────────────────────

struct WalAppend {
    event: Event,
    response: oneshot::Sender<io::Result<()>>,
}

/// Background task that owns the journal and batches appends for group commit.
/// 1. Block until the first append arrives.
/// 2. Drain every append already queued (the batch window).
/// 3. One flush + fsync for the whole batch.
/// 4. Answer every sender with the batch result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalAppend>) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        while let Ok(next) = rx.try_recv() {
            batch.push(next);
        }

        metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            tracing::error!("journal {}: flush failed: {e}", wal.path().display());
        }

        for append in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = append.response.send(r);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[WalAppend]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for append in batch {
        if let Err(e) = wal.append_buffered(&append.event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so half-buffered bytes don't leak
    // into the next batch; every caller in this batch is told it failed.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

/// The booking engine: keyed store plus journal. One per process, shared
/// behind an `Arc` by every request handler.
pub struct Engine {
    store: InMemoryStore,
    wal_tx: mpsc::Sender<WalAppend>,
}

impl Engine {
    /// Replay the journal at `wal_path`, compact it when it holds more than
    /// `compact_threshold` records (0 disables), and start the writer task.
    ///
    /// Must be called inside a tokio runtime.
    pub fn open(wal_path: &Path, compact_threshold: u64) -> io::Result<Self> {
        let events = Wal::replay(wal_path)?;
        let store = InMemoryStore::new();
        for event in &events {
            store.apply_replayed(event)?;
        }
        metrics::counter!(observability::WAL_RECORDS_REPLAYED_TOTAL).increment(events.len() as u64);
        info!(
            "journal {}: replayed {} records ({} facilities, {} reservations)",
            wal_path.display(),
            events.len(),
            store.facility_count(),
            store.reservation_count()
        );

        if compact_threshold > 0 && events.len() as u64 > compact_threshold {
            let snapshot = store.snapshot_events()?;
            if snapshot.len() < events.len() {
                Wal::rewrite(wal_path, &snapshot)?;
                info!(
                    "journal {}: compacted {} records to {}",
                    wal_path.display(),
                    events.len(),
                    snapshot.len()
                );
            }
        }

        let wal = Wal::open(wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        Ok(Self { store, wal_tx })
    }

    /// Durably append `event` via the group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalAppend {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::StoreFailure("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::StoreFailure("journal writer dropped response".into()))?
            .map_err(|e| EngineError::StoreFailure(e.to_string()))
    }

    /// Journal a catalog event, then apply it.
    pub(super) async fn persist_catalog(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_catalog(event);
        Ok(())
    }

    /// Journal a reservation event, then apply it to the locked partition.
    pub(super) async fn persist_and_apply(
        &self,
        partition: &mut PartitionState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_to_partition(partition, event);
        Ok(())
    }
}
