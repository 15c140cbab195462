//! Inbound contract: raw `YYYY-MM-DD` strings in, typed results out.
//!
//! Each call reads "today" once, runs the admission rules, and only then
//! touches the ledger.

use std::sync::Arc;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::engine::validation::{parse_stay, parse_window};
use crate::engine::{Engine, EngineError};
use crate::model::Reservation;

#[derive(Clone)]
pub struct Campsite {
    engine: Arc<Engine>,
}

impl Campsite {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Free days in the window, ascending. Either bound may be omitted.
    pub async fn check_availability(
        &self,
        arrival: Option<&str>,
        departure: Option<&str>,
    ) -> Result<Vec<NaiveDate>, EngineError> {
        let window = parse_window(arrival, departure, self.engine.today())?;
        Ok(self.engine.availability(&window).await?.collect())
    }

    pub async fn create_reservation(
        &self,
        owner_id: &str,
        arrival: Option<&str>,
        departure: Option<&str>,
    ) -> Result<Ulid, EngineError> {
        let stay = parse_stay(arrival, departure, self.engine.today())?;
        self.engine.create(owner_id, stay).await
    }

    pub async fn update_reservation(
        &self,
        id: Ulid,
        arrival: Option<&str>,
        departure: Option<&str>,
    ) -> Result<(), EngineError> {
        let stay = parse_stay(arrival, departure, self.engine.today())?;
        self.engine.update(id, stay).await
    }

    pub async fn cancel_reservation(&self, id: Ulid) -> Result<(), EngineError> {
        self.engine.cancel(id).await
    }

    pub async fn reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.engine.get(id).await
    }

    pub async fn reservations(&self) -> Result<Vec<Reservation>, EngineError> {
        self.engine.list().await
    }
}
