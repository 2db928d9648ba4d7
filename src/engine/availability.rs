use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::model::*;

// ── Booked-date index ─────────────────────────────────────────────

/// Calendar days covered by active reservations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookedDates(BTreeSet<NaiveDate>);

impl BookedDates {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.0.contains(&date)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Ascending.
    pub fn iter(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<NaiveDate> for BookedDates {
    fn from_iter<I: IntoIterator<Item = NaiveDate>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Expand reservation ranges into the set of booked days.
///
/// Both ends are inclusive: the check-out day of an existing stay cannot be
/// the check-in day of a new one (turnover day). Callers pass active
/// reservations only.
pub fn expand_to_booked_dates(reservations: &[StayRange]) -> BookedDates {
    reservations
        .iter()
        .flat_map(|r| r.dates_inclusive())
        .collect()
}

pub fn is_date_booked(date: NaiveDate, booked: &BookedDates) -> bool {
    booked.contains(date)
}

/// Earliest booked day in the closed interval `[start, end]`.
pub fn first_booked_in(start: NaiveDate, end: NaiveDate, booked: &BookedDates) -> Option<NaiveDate> {
    if end < start {
        return None;
    }
    booked.0.range(start..=end).next().copied()
}

/// True iff no day of the closed interval `[start, end]` is booked.
pub fn is_valid_selection(start: NaiveDate, end: NaiveDate, booked: &BookedDates) -> bool {
    first_booked_in(start, end, booked).is_none()
}
