use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::engine::BookedDates;
use crate::model::StayRange;

/// Date-picker selection. Cycles for the lifetime of the widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Selection {
    #[default]
    NoneSelected,
    CheckInSelected {
        check_in: NaiveDate,
    },
    RangeSelected {
        check_in: NaiveDate,
        check_out: NaiveDate,
    },
}

impl Selection {
    /// Apply a click on `date`. Booked dates are ignored in every state.
    pub fn click(self, date: NaiveDate, booked: &BookedDates) -> Selection {
        if booked.contains(date) {
            return self;
        }
        match self {
            Selection::CheckInSelected { check_in } if date > check_in => Selection::RangeSelected {
                check_in,
                check_out: date,
            },
            // First click, a click on/before the pending check-in, or a
            // restart after a full range all begin a new selection.
            Selection::NoneSelected
            | Selection::CheckInSelected { .. }
            | Selection::RangeSelected { .. } => Selection::CheckInSelected { check_in: date },
        }
    }

    pub fn check_in(&self) -> Option<NaiveDate> {
        match self {
            Selection::NoneSelected => None,
            Selection::CheckInSelected { check_in } | Selection::RangeSelected { check_in, .. } => {
                Some(*check_in)
            }
        }
    }

    pub fn check_out(&self) -> Option<NaiveDate> {
        match self {
            Selection::RangeSelected { check_out, .. } => Some(*check_out),
            _ => None,
        }
    }

    /// The selected stay once both ends are chosen.
    pub fn stay(&self) -> Option<StayRange> {
        match self {
            Selection::RangeSelected {
                check_in,
                check_out,
            } => StayRange::new(*check_in, *check_out).ok(),
            _ => None,
        }
    }

    /// Whether a calendar cell should be highlighted.
    pub fn highlights(&self, date: NaiveDate) -> bool {
        match self {
            Selection::NoneSelected => false,
            Selection::CheckInSelected { check_in } => *check_in == date,
            Selection::RangeSelected {
                check_in,
                check_out,
            } => *check_in <= date && date <= *check_out,
        }
    }
}
