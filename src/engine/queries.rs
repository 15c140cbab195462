use ulid::Ulid;

use crate::model::*;
use crate::observability;

use super::availability::{free_days, FreeDays};
use super::validation::QueryWindow;
use super::{Engine, EngineError};

impl Engine {
    /// Reservations occupying at least one day of `window`, read under one
    /// guard so a concurrent commit is either fully visible or not at all.
    pub async fn find_intersecting(&self, window: &DateInterval) -> Result<Vec<Reservation>, EngineError> {
        let guard = self.read_state().await?;
        Ok(guard.intersecting(window).cloned().collect())
    }

    pub async fn exists(&self, id: Ulid) -> Result<bool, EngineError> {
        Ok(self.read_state().await?.exists(&id))
    }

    pub async fn get(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let guard = self.read_state().await?;
        guard.get(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// All live reservations in arrival order.
    pub async fn list(&self) -> Result<Vec<Reservation>, EngineError> {
        Ok(self.read_state().await?.iter().cloned().collect())
    }

    /// Free days of a validated window, from a consistent snapshot.
    pub async fn availability(&self, window: &QueryWindow) -> Result<FreeDays, EngineError> {
        metrics::counter!(observability::AVAILABILITY_QUERIES_TOTAL).increment(1);
        let span = window.as_interval();
        let guard = self.read_state().await?;
        let free = free_days(&span, guard.intersecting(&span).map(|r| &r.interval));
        Ok(free)
    }
}
