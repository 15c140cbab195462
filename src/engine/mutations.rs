use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::{Engine, EngineError};

fn validate_owner(owner_id: &str) -> Result<(), EngineError> {
    if owner_id.trim().is_empty() {
        return Err(EngineError::MalformedInput("owner_id is required".into()));
    }
    if owner_id.len() > MAX_OWNER_ID_LEN {
        return Err(EngineError::LimitExceeded("owner_id too long"));
    }
    Ok(())
}

fn record<T>(op: &'static str, result: &Result<T, EngineError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::counter!(observability::RESERVATIONS_TOTAL, "op" => op, "outcome" => outcome).increment(1);
}

impl Engine {
    /// Admit a validated stay. Overlap check and insert run under one write guard.
    pub async fn create(&self, owner_id: &str, interval: DateInterval) -> Result<Ulid, EngineError> {
        let result = self.create_inner(owner_id, interval).await;
        record("create", &result);
        result
    }

    async fn create_inner(&self, owner_id: &str, interval: DateInterval) -> Result<Ulid, EngineError> {
        validate_owner(owner_id)?;
        let mut guard = self.write_state().await?;
        if guard.len() >= MAX_RESERVATIONS {
            return Err(EngineError::LimitExceeded("too many reservations"));
        }
        if let Some(existing) = guard.first_conflict(&interval, None) {
            tracing::debug!("create {interval} rejected: overlaps {}", existing.id);
            return Err(EngineError::Conflict(existing.id));
        }

        let id = Ulid::new();
        let event = Event::ReservationCreated {
            id,
            owner_id: owner_id.to_string(),
            interval,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!("reservation {id} committed for {interval}");
        Ok(id)
    }

    /// Move a reservation to a validated stay. Its own current stay does not
    /// count as a conflict.
    pub async fn update(&self, id: Ulid, interval: DateInterval) -> Result<(), EngineError> {
        let result = self.update_inner(id, interval).await;
        record("update", &result);
        result
    }

    async fn update_inner(&self, id: Ulid, interval: DateInterval) -> Result<(), EngineError> {
        let mut guard = self.write_state().await?;
        let current = guard.get(&id).ok_or(EngineError::NotFound(id))?.interval;
        if let Some(existing) = guard.first_conflict(&interval, Some(id)) {
            tracing::debug!("update of {id} to {interval} rejected: overlaps {}", existing.id);
            return Err(EngineError::Conflict(existing.id));
        }
        if current == interval {
            return Ok(());
        }

        let event = Event::ReservationRescheduled { id, interval };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!("reservation {id} moved from {current} to {interval}");
        Ok(())
    }

    /// Hard-delete a reservation. A stay that has fully elapsed cannot be cancelled.
    pub async fn cancel(&self, id: Ulid) -> Result<(), EngineError> {
        let result = self.cancel_inner(id).await;
        record("cancel", &result);
        result
    }

    async fn cancel_inner(&self, id: Ulid) -> Result<(), EngineError> {
        let mut guard = self.write_state().await?;
        let stay = guard.get(&id).ok_or(EngineError::NotFound(id))?.interval;
        if stay.end <= self.today() {
            return Err(EngineError::InvalidState("cannot cancel a past reservation"));
        }

        let event = Event::ReservationCancelled { id };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!("reservation {id} cancelled");
        Ok(())
    }

    /// Rewrite the WAL with only the events needed to rebuild the current set.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // Hold the read guard until the writer has swapped files, so no commit
        // lands in the old log after the snapshot was taken.
        let guard = self.read_state().await?;
        let events = guard.snapshot_events();

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.wal_tx
            .send(super::WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::storage("compact", "WAL writer shut down"))?;
        rx.await
            .map_err(|_| EngineError::storage("compact", "WAL writer dropped response"))?
            .map_err(|e| EngineError::storage("compact", e))?;
        drop(guard);
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = tokio::sync::oneshot::channel();
        if self
            .wal_tx
            .send(super::WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
