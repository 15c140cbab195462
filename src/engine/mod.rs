mod availability;
mod error;
mod mutations;
mod queries;
pub mod store;
pub mod validation;
#[cfg(test)]
mod tests;

pub use availability::{free_days, taken_days, FreeDays};
pub use error::{EngineError, RangeViolation};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::clock::Clock;
use crate::model::*;
use crate::observability;
use crate::wal::Wal;

use store::CommittedSet;

// ── WAL writer channel ───────────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
    Close {
        response: oneshot::Sender<io::Result<()>>,
    },
}

/// Background task that owns the WAL. Each append is synced before its
/// sender hears back; mutations hold the ledger's write guard while they
/// wait, so appends arrive one at a time.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let started = Instant::now();
                let result = wal.append(&event);
                metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(started.elapsed().as_secs_f64());
                let _ = response.send(result);
            }
            WalCommand::Compact { events, response } => {
                let result = Wal::write_compact_file(wal.path(), &events)
                    .and_then(|()| wal.swap_compact_file());
                let _ = response.send(result);
            }
            WalCommand::AppendsSinceCompact { response } => {
                let _ = response.send(wal.appends_since_compact());
            }
            WalCommand::Close { response } => {
                let _ = response.send(wal.sync());
                return;
            }
        }
    }
}

/// The reservation ledger: sole owner of the committed set.
///
/// Every mutation takes the write guard, checks for overlap, makes the event
/// durable in the WAL and applies it, all before releasing the guard. Two
/// overlapping admissions therefore serialize, and the second one sees the
/// first one's stay.
pub struct Engine {
    state: RwLock<CommittedSet>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    clock: Arc<dyn Clock>,
    lock_timeout: Duration,
}

impl Engine {
    /// Replay the WAL at `wal_path` and start its writer task.
    /// Must be called inside a tokio runtime.
    pub fn open(wal_path: PathBuf, clock: Arc<dyn Clock>, lock_timeout: Duration) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let mut state = CommittedSet::new();
        let mut skipped = 0usize;
        for event in &events {
            if let Some(holder) = state.replay_conflict(event) {
                tracing::warn!(
                    "skipping WAL record for {}: overlaps {holder}",
                    event.reservation_id()
                );
                skipped += 1;
                continue;
            }
            state.apply(event);
        }
        tracing::info!(
            "ledger opened: {} events replayed, {skipped} skipped, {} live reservations",
            events.len(),
            state.len()
        );

        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        Ok(Self {
            state: RwLock::new(state),
            wal_tx,
            clock,
            lock_timeout,
        })
    }

    /// Flush and stop the WAL writer. Later mutations fail with a storage error.
    pub async fn close(&self) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Close { response: tx })
            .await
            .map_err(|_| EngineError::storage("close", "WAL writer already stopped"))?;
        rx.await
            .map_err(|_| EngineError::storage("close", "WAL writer dropped response"))?
            .map_err(|e| EngineError::storage("close", e))?;
        tracing::info!("ledger closed");
        Ok(())
    }

    pub fn today(&self) -> chrono::NaiveDate {
        self.clock.today()
    }

    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::storage("wal append", "WAL writer shut down"))?;
        rx.await
            .map_err(|_| EngineError::storage("wal append", "WAL writer dropped response"))?
            .map_err(|e| EngineError::storage("wal append", e))
    }

    /// Make `event` durable, then apply it. Caller holds the write guard.
    pub(super) async fn persist_and_apply(
        &self,
        state: &mut CommittedSet,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        state.apply(event);
        Ok(())
    }

    /// Write guard, or `Busy` once the lock timeout elapses.
    pub(super) async fn write_state(&self) -> Result<RwLockWriteGuard<'_, CommittedSet>, EngineError> {
        tokio::time::timeout(self.lock_timeout, self.state.write())
            .await
            .map_err(|_| self.busy())
    }

    pub(super) async fn read_state(&self) -> Result<RwLockReadGuard<'_, CommittedSet>, EngineError> {
        tokio::time::timeout(self.lock_timeout, self.state.read())
            .await
            .map_err(|_| self.busy())
    }

    fn busy(&self) -> EngineError {
        tracing::warn!("ledger lock not acquired within {:?}", self.lock_timeout);
        metrics::counter!(observability::LOCK_TIMEOUTS_TOTAL).increment(1);
        EngineError::Busy
    }
}
