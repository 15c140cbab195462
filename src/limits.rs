use std::time::Duration;

/// Longest stay, in nights, a single reservation may cover.
pub const MAX_STAY_NIGHTS: i64 = 3;

/// Minimum days between today and the arrival date.
pub const MIN_LEAD_DAYS: u64 = 1;

/// How far ahead, in months, arrival and departure may be placed.
pub const BOOKING_HORIZON_MONTHS: u32 = 1;

pub const MAX_OWNER_ID_LEN: usize = 256;

/// Upper bound on live reservations held by one ledger.
pub const MAX_RESERVATIONS: usize = 100_000;

pub const MAX_LINE_LEN: usize = 1024;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(2_000);
