use chrono::NaiveDate;
use thiserror::Error;
use ulid::Ulid;

/// Which admission rule rejected a candidate, and the bound it crossed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeViolation {
    #[error("departure {departure} not after arrival {arrival}")]
    DepartureNotAfterArrival {
        arrival: NaiveDate,
        departure: NaiveDate,
    },
    #[error("insufficient lead time: arrival {arrival}, earliest {earliest}")]
    InsufficientLeadTime {
        arrival: NaiveDate,
        earliest: NaiveDate,
    },
    #[error("stay too long: {nights} nights, max {max_nights}")]
    StayTooLong {
        nights: i64,
        max_nights: i64,
    },
    #[error("beyond booking horizon: {date} is after {horizon}")]
    BeyondHorizon {
        date: NaiveDate,
        horizon: NaiveDate,
    },
}

impl RangeViolation {
    /// Stable rule name for the boundary layer.
    pub fn rule(&self) -> &'static str {
        match self {
            RangeViolation::DepartureNotAfterArrival { .. } => "departure_not_after_arrival",
            RangeViolation::InsufficientLeadTime { .. } => "insufficient_lead_time",
            RangeViolation::StayTooLong { .. } => "stay_too_long",
            RangeViolation::BeyondHorizon { .. } => "beyond_booking_horizon",
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("invalid range: {0}")]
    InvalidRange(#[from] RangeViolation),
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("conflict with reservation: {0}")]
    Conflict(Ulid),
    #[error("ledger busy, try again")]
    Busy,
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("storage failure, reference {reference}")]
    StorageFailure { reference: Ulid },
}

impl EngineError {
    /// Stable error kind for the boundary layer.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::MalformedInput(_) => "malformed_input",
            EngineError::InvalidRange(_) => "invalid_range",
            EngineError::NotFound(_) => "not_found",
            EngineError::Conflict(_) => "conflict",
            EngineError::Busy => "busy",
            EngineError::InvalidState(_) => "invalid_state",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::StorageFailure { .. } => "storage_failure",
        }
    }

    /// Log the underlying fault and hand back only an opaque reference.
    pub(crate) fn storage(context: &str, cause: impl std::fmt::Display) -> Self {
        let reference = Ulid::new();
        tracing::error!(%reference, "{context}: {cause}");
        EngineError::StorageFailure { reference }
    }
}
