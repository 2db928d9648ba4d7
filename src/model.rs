use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;
use crate::limits::*;

/// Unix milliseconds, used only for creation timestamps.
pub type Ms = i64;

/// Label carried by nights that no season rule priced.
pub const BASE_LABEL: &str = "Base";

/// A stay `[check_in, check_out)` in whole calendar days.
/// The check-out day is never charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StayRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl StayRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Result<Self, EngineError> {
        if check_out <= check_in {
            return Err(EngineError::InvalidRange {
                check_in,
                check_out,
            });
        }
        Ok(Self {
            check_in,
            check_out,
        })
    }

    pub fn nights(&self) -> u32 {
        (self.check_out - self.check_in).num_days() as u32
    }

    /// Every charged night, check-in inclusive, check-out exclusive.
    pub fn nights_iter(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.check_out;
        self.check_in.iter_days().take_while(move |d| *d < end)
    }

    /// Every calendar day touched by the stay, both ends inclusive.
    pub fn dates_inclusive(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.check_out;
        self.check_in.iter_days().take_while(move |d| *d <= end)
    }

    pub fn overlaps_inclusive(&self, other: &StayRange) -> bool {
        self.check_in <= other.check_out && other.check_in <= self.check_out
    }
}

/// How a season rule decides whether it applies to a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleMatch {
    /// Inclusive on both ends.
    DateRange { start: NaiveDate, end: NaiveDate },
    /// Weekday indices, 0 = Sunday .. 6 = Saturday. Sorted, no duplicates.
    Weekdays { days: Vec<u8> },
}

impl RuleMatch {
    pub fn matches(&self, date: NaiveDate) -> bool {
        match self {
            RuleMatch::DateRange { start, end } => *start <= date && date <= *end,
            RuleMatch::Weekdays { days } => {
                let idx = date.weekday().num_days_from_sunday() as u8;
                days.contains(&idx)
            }
        }
    }
}

/// A multiplier on the base nightly price. Only constructible through
/// [`SeasonRule::new`], so every stored rule is well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonRule {
    name: String,
    multiplier: Decimal,
    matcher: RuleMatch,
}

impl SeasonRule {
    pub fn new(name: impl Into<String>, multiplier: Decimal, matcher: RuleMatch) -> Result<Self, EngineError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(EngineError::InvalidRule("rule name is empty".into()));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::InvalidRule("rule name too long".into()));
        }
        if multiplier < Decimal::ONE {
            return Err(EngineError::InvalidRule(format!(
                "rule {name}: multiplier {multiplier} is below 1"
            )));
        }
        let matcher = match matcher {
            RuleMatch::DateRange { start, end } => {
                if start > end {
                    return Err(EngineError::InvalidRule(format!(
                        "rule {name}: start {start} is after end {end}"
                    )));
                }
                RuleMatch::DateRange { start, end }
            }
            RuleMatch::Weekdays { mut days } => {
                if days.is_empty() {
                    return Err(EngineError::InvalidRule(format!("rule {name}: no weekdays")));
                }
                if let Some(bad) = days.iter().find(|d| **d > 6) {
                    return Err(EngineError::InvalidRule(format!(
                        "rule {name}: weekday index {bad} out of range 0..=6"
                    )));
                }
                days.sort_unstable();
                days.dedup();
                RuleMatch::Weekdays { days }
            }
        };
        Ok(Self {
            name,
            multiplier,
            matcher,
        })
    }

    pub fn date_range(name: impl Into<String>, multiplier: Decimal, start: NaiveDate, end: NaiveDate) -> Result<Self, EngineError> {
        Self::new(name, multiplier, RuleMatch::DateRange { start, end })
    }

    pub fn weekdays(name: impl Into<String>, multiplier: Decimal, days: Vec<u8>) -> Result<Self, EngineError> {
        Self::new(name, multiplier, RuleMatch::Weekdays { days })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn multiplier(&self) -> Decimal {
        self.multiplier
    }

    pub fn matcher(&self) -> &RuleMatch {
        &self.matcher
    }

    pub fn matches(&self, date: NaiveDate) -> bool {
        self.matcher.matches(date)
    }

    /// Re-run construction checks on a rule that arrived through deserialization.
    pub fn validate(&self) -> Result<(), EngineError> {
        Self::new(self.name.clone(), self.multiplier, self.matcher.clone()).map(|_| ())
    }
}

/// Pricing owned by a cabin. Rule order is evaluation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceConfig {
    pub base_price: Option<Decimal>,
    pub season_rules: Vec<SeasonRule>,
}

impl PriceConfig {
    pub fn new(base_price: Decimal) -> Self {
        Self {
            base_price: Some(base_price),
            season_rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: SeasonRule) -> Self {
        self.season_rules.push(rule);
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.season_rules.len() > MAX_SEASON_RULES {
            return Err(EngineError::LimitExceeded("too many season rules"));
        }
        for rule in &self.season_rules {
            rule.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightlyPrice {
    pub date: NaiveDate,
    pub price: Decimal,
    pub applied_rule: String,
    pub is_override: bool,
}

/// Priced stay: night count, total and the chronological per-night breakdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub nights: u32,
    pub total: Decimal,
    pub breakdown: Vec<NightlyPrice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    /// Active reservations block their dates.
    pub fn is_active(self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Confirmed)
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestInfo {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default = "default_guest_count")]
    pub guest_count: u32,
    #[serde(default)]
    pub special_requests: String,
}

fn default_guest_count() -> u32 {
    1
}

/// What the booking form hands to persistence. Always `Pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub cabin_id: Ulid,
    pub stay: StayRange,
    pub quote: Quote,
    pub base_price: Decimal,
    pub guest: GuestInfo,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub status: ReservationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub created_at: Ms,
    pub request: ReservationRequest,
    pub status: ReservationStatus,
}

impl Reservation {
    pub fn stay(&self) -> StayRange {
        self.request.stay
    }
}

#[derive(Debug, Clone)]
pub struct CabinState {
    pub id: Ulid,
    pub name: String,
    pub price_config: PriceConfig,
    /// All reservations ever made for this cabin, sorted by check-in.
    pub reservations: Vec<Reservation>,
}

impl CabinState {
    pub fn new(id: Ulid, name: String, price_config: PriceConfig) -> Self {
        Self {
            id,
            name,
            price_config,
            reservations: Vec::new(),
        }
    }

    /// Insert keeping check-in order.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.request.stay.check_in <= reservation.request.stay.check_in);
        self.reservations.insert(pos, reservation);
    }

    pub fn reservation_mut(&mut self, id: Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Active reservation ranges, the input of booked-date expansion.
    pub fn active_ranges(&self) -> Vec<StayRange> {
        self.reservations
            .iter()
            .filter(|r| r.status.is_active())
            .map(|r| r.request.stay)
            .collect()
    }

    /// Active reservations whose inclusive span touches `query`'s inclusive span.
    /// Skips everything checking in after `query.check_out`.
    pub fn overlapping_active(&self, query: &StayRange) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.request.stay.check_in <= query.check_out);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.status.is_active() && r.request.stay.check_out >= query.check_in)
    }

    pub fn has_active_reservations(&self) -> bool {
        self.reservations.iter().any(|r| r.status.is_active())
    }
}

/// The event types, flat. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    CabinCreated {
        id: Ulid,
        name: String,
        price_config: PriceConfig,
    },
    PriceConfigUpdated {
        id: Ulid,
        price_config: PriceConfig,
    },
    CabinDeleted {
        id: Ulid,
    },
    ReservationCreated {
        id: Ulid,
        created_at: Ms,
        request: ReservationRequest,
    },
    ReservationStatusChanged {
        id: Ulid,
        cabin_id: Ulid,
        status: ReservationStatus,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CabinInfo {
    pub id: Ulid,
    pub name: String,
    pub price_config: PriceConfig,
}

#[cfg(test)]
pub fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid calendar date")
}

#[cfg(test)]
pub fn add_days(date: NaiveDate, n: u64) -> NaiveDate {
    date.checked_add_days(chrono::Days::new(n)).expect("date in range")
}
