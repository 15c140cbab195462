use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Whole-day range `[start, end)`: a stay occupies `start` through the day
/// before `end`. The departure day itself is free for the next arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateInterval {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateInterval {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start < end, "DateInterval start must be before end");
        Self { start, end }
    }

    /// `None` unless `start < end`.
    pub fn try_new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// Interval covering the inclusive day window `[first, last]`.
    pub fn window(first: NaiveDate, last: NaiveDate) -> Self {
        let end = last.succ_opt().unwrap_or(NaiveDate::MAX);
        Self::new(first, end)
    }

    /// Number of occupied days.
    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// Every occupied calendar day, ascending. This is the single definition
    /// of occupancy: overlap and availability are both derived from it.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + Clone + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d < end)
    }

    pub fn occupies(&self, day: NaiveDate) -> bool {
        self.start <= day && day < self.end
    }

    /// True iff the two intervals occupy at least one common day.
    /// Equivalent to intersecting `days()` of both sides.
    pub fn overlaps(&self, other: &DateInterval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl std::fmt::Display for DateInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// A committed stay. Only the ledger constructs these; the id is assigned
/// at commit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub owner_id: String,
    pub interval: DateInterval,
}

/// The event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationCreated {
        id: Ulid,
        owner_id: String,
        interval: DateInterval,
    },
    ReservationRescheduled {
        id: Ulid,
        interval: DateInterval,
    },
    ReservationCancelled {
        id: Ulid,
    },
}

impl Event {
    pub fn reservation_id(&self) -> Ulid {
        match self {
            Event::ReservationCreated { id, .. }
            | Event::ReservationRescheduled { id, .. }
            | Event::ReservationCancelled { id } => *id,
        }
    }
}
