use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::model::*;

// ── Day enumeration ───────────────────────────────────────────────

/// Days inside `window` that any of `stays` occupies. Uses
/// [`DateInterval::days`], the same occupancy rule the conflict check uses.
pub fn taken_days<'a>(
    window: &DateInterval,
    stays: impl IntoIterator<Item = &'a DateInterval>,
) -> BTreeSet<NaiveDate> {
    stays
        .into_iter()
        .flat_map(|stay| stay.days())
        .filter(|day| window.occupies(*day))
        .collect()
}

/// Free days of an inclusive window, ascending.
///
/// Lazy and finite. Cloning yields an independent cursor from the current
/// position, so a fresh clone taken before iteration restarts the sequence.
#[derive(Debug, Clone)]
pub struct FreeDays {
    next: Option<NaiveDate>,
    end: NaiveDate,
    taken: Arc<BTreeSet<NaiveDate>>,
}

impl FreeDays {
    pub fn taken(&self) -> &BTreeSet<NaiveDate> {
        &self.taken
    }
}

impl Iterator for FreeDays {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        while let Some(day) = self.next {
            if day >= self.end {
                self.next = None;
                return None;
            }
            self.next = day.succ_opt();
            if !self.taken.contains(&day) {
                return Some(day);
            }
        }
        None
    }
}

/// Free days in `window` given the stays that intersect it.
pub fn free_days<'a>(
    window: &DateInterval,
    stays: impl IntoIterator<Item = &'a DateInterval>,
) -> FreeDays {
    FreeDays {
        next: Some(window.start),
        end: window.end,
        taken: Arc::new(taken_days(window, stays)),
    }
}
