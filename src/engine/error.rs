use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::ReservationStatus;

#[derive(Debug)]
pub enum EngineError {
    InvalidRange {
        check_in: NaiveDate,
        check_out: NaiveDate,
    },
    InvalidRule(String),
    MissingBasePrice,
    QuoteMismatch {
        check_in: NaiveDate,
        check_out: NaiveDate,
    },
    DatesUnavailable(NaiveDate),
    Incomplete(&'static str),
    InvalidGuestCount(u32),
    NotFound(Ulid),
    AlreadyExists(Ulid),
    HasActiveReservations(Ulid),
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },
    PermissionDenied(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
    Encode(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidRange {
                check_in,
                check_out,
            } => write!(
                f,
                "invalid range: check-out {check_out} must be after check-in {check_in}"
            ),
            EngineError::InvalidRule(msg) => write!(f, "invalid season rule: {msg}"),
            EngineError::MissingBasePrice => write!(f, "cabin has no base price configured"),
            EngineError::QuoteMismatch {
                check_in,
                check_out,
            } => write!(f, "quote does not cover the stay {check_in} to {check_out}"),
            EngineError::DatesUnavailable(date) => write!(f, "date already booked: {date}"),
            EngineError::Incomplete(what) => write!(f, "incomplete reservation: {what}"),
            EngineError::InvalidGuestCount(n) => write!(f, "invalid guest count: {n}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::HasActiveReservations(id) => {
                write!(f, "cannot delete cabin {id}: has active reservations")
            }
            EngineError::InvalidTransition { from, to } => {
                write!(f, "cannot change reservation status from {from} to {to}")
            }
            EngineError::PermissionDenied(role) => write!(f, "permission denied: requires {role}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
            EngineError::Encode(e) => write!(f, "encode error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
