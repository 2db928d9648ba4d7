use rust_decimal::Decimal;

use crate::limits::*;
use crate::model::*;

use super::availability::{expand_to_booked_dates, first_booked_in};
use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

pub(crate) fn validate_stay(stay: &StayRange) -> Result<(), EngineError> {
    if stay.check_out <= stay.check_in {
        return Err(EngineError::InvalidRange {
            check_in: stay.check_in,
            check_out: stay.check_out,
        });
    }
    if stay.nights() > MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(())
}

/// A supplied quote must price exactly the nights of `stay`, in order, and
/// its total must be the sum of its breakdown.
pub(crate) fn validate_quote(stay: &StayRange, quote: &Quote) -> Result<(), EngineError> {
    let nights_match = quote.nights == stay.nights()
        && quote.breakdown.len() == quote.nights as usize
        && quote
            .breakdown
            .iter()
            .map(|n| n.date)
            .eq(stay.nights_iter());
    let total: Decimal = quote.breakdown.iter().map(|n| n.price).sum();
    if !nights_match || total != quote.total {
        return Err(EngineError::QuoteMismatch {
            check_in: stay.check_in,
            check_out: stay.check_out,
        });
    }
    Ok(())
}

/// Fails with the earliest already-booked day of `stay`'s closed interval.
/// Same inclusive semantics as the booking widget's booked set.
pub(crate) fn check_available(cabin: &CabinState, stay: &StayRange) -> Result<(), EngineError> {
    let nearby: Vec<StayRange> = cabin.overlapping_active(stay).map(|r| r.stay()).collect();
    if nearby.is_empty() {
        return Ok(());
    }
    let booked = expand_to_booked_dates(&nearby);
    match first_booked_in(stay.check_in, stay.check_out, &booked) {
        Some(date) => Err(EngineError::DatesUnavailable(date)),
        None => Ok(()),
    }
}
