use std::collections::HashMap;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

/// The committed set: every live reservation, sorted by arrival.
///
/// Holds no lock of its own. The engine wraps it in one `RwLock` so that an
/// overlap check and the insert that follows it happen under the same guard.
#[derive(Debug, Default)]
pub struct CommittedSet {
    /// Sorted by `interval.start`. Disjoint by invariant, so also sorted by end.
    reservations: Vec<Reservation>,
    /// Live id → arrival date, so lookups binary-search instead of scanning.
    starts: HashMap<Ulid, NaiveDate>,
}

impl CommittedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }

    pub fn exists(&self, id: &Ulid) -> bool {
        self.starts.contains_key(id)
    }

    /// Index of `id` in `reservations`.
    fn position(&self, id: &Ulid) -> Option<usize> {
        let start = *self.starts.get(id)?;
        let from = self
            .reservations
            .partition_point(|r| r.interval.start < start);
        self.reservations[from..]
            .iter()
            .take_while(|r| r.interval.start == start)
            .position(|r| r.id == *id)
            .map(|offset| from + offset)
    }

    pub fn get(&self, id: &Ulid) -> Option<&Reservation> {
        self.position(id).map(|pos| &self.reservations[pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.iter()
    }

    /// Insert keeping arrival order.
    pub fn insert(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.interval.start < reservation.interval.start);
        self.starts.insert(reservation.id, reservation.interval.start);
        self.reservations.insert(pos, reservation);
    }

    /// Move an existing reservation to a new interval. Returns the old one.
    pub fn replace_interval(&mut self, id: &Ulid, interval: DateInterval) -> Option<DateInterval> {
        let mut reservation = self.delete(id)?;
        let previous = reservation.interval;
        reservation.interval = interval;
        self.insert(reservation);
        Some(previous)
    }

    pub fn delete(&mut self, id: &Ulid) -> Option<Reservation> {
        let pos = self.position(id)?;
        self.starts.remove(id);
        Some(self.reservations.remove(pos))
    }

    /// Reservations occupying at least one day of `window`.
    /// Binary-searches past everything arriving on or after `window.end`.
    pub fn intersecting(&self, window: &DateInterval) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.interval.start < window.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.interval.overlaps(window))
    }

    /// First reservation, other than `except`, whose stay overlaps `candidate`.
    pub fn first_conflict(&self, candidate: &DateInterval, except: Option<Ulid>) -> Option<&Reservation> {
        self.intersecting(candidate)
            .find(|r| Some(r.id) != except)
    }

    /// Apply a committed event. Replay and live commits both go through here.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::ReservationCreated { id, owner_id, interval } => {
                self.insert(Reservation {
                    id: *id,
                    owner_id: owner_id.clone(),
                    interval: *interval,
                });
            }
            Event::ReservationRescheduled { id, interval } => {
                self.replace_interval(id, *interval);
            }
            Event::ReservationCancelled { id } => {
                self.delete(id);
            }
        }
    }

    /// The reservation `event` would overlap if applied. Replay refuses such
    /// records so a rebuilt set is disjoint even if the log is not.
    pub fn replay_conflict(&self, event: &Event) -> Option<Ulid> {
        match event {
            Event::ReservationCreated { id, interval, .. }
            | Event::ReservationRescheduled { id, interval } => {
                self.first_conflict(interval, Some(*id)).map(|r| r.id)
            }
            Event::ReservationCancelled { .. } => None,
        }
    }

    /// Minimal event stream that rebuilds this set.
    pub fn snapshot_events(&self) -> Vec<Event> {
        self.reservations
            .iter()
            .map(|r| Event::ReservationCreated {
                id: r.id,
                owner_id: r.owner_id.clone(),
                interval: r.interval,
            })
            .collect()
    }
}
