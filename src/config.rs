use std::path::PathBuf;

use rust_decimal::Decimal;

use crate::engine::{MissingPricePolicy, PricingPolicy, Rounding, DEFAULT_FALLBACK_PRICE};
use crate::session::{Session, User, ADMIN_ROLE};

/// Process settings, read from `STAYBOOK_*` environment variables.
/// Unparseable values fall back to the default.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
    pub pricing: PricingPolicy,
    /// Use the checked insert for new reservations.
    pub atomic_reserve: bool,
    pub operator_email: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            compact_threshold: 1000,
            pricing: PricingPolicy::default(),
            atomic_reserve: true,
            operator_email: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let fallback_price = get("STAYBOOK_FALLBACK_PRICE")
            .and_then(|s| s.trim().parse::<Decimal>().ok())
            .filter(|p| *p > Decimal::ZERO)
            .unwrap_or(DEFAULT_FALLBACK_PRICE);
        let missing_price = match get("STAYBOOK_MISSING_PRICE").as_deref().map(str::trim) {
            Some("reject") => MissingPricePolicy::Reject,
            _ => MissingPricePolicy::Fallback(fallback_price),
        };
        let rounding = match get("STAYBOOK_ROUNDING").as_deref().map(str::trim) {
            Some("whole") => Rounding::WholeUnits,
            _ => Rounding::Exact,
        };

        Self {
            data_dir: get("STAYBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            metrics_port: get("STAYBOOK_METRICS_PORT").and_then(|s| s.trim().parse().ok()),
            compact_threshold: get("STAYBOOK_COMPACT_THRESHOLD")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.compact_threshold),
            pricing: PricingPolicy {
                missing_price,
                rounding,
            },
            atomic_reserve: get("STAYBOOK_ATOMIC_RESERVE")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.atomic_reserve),
            operator_email: get("STAYBOOK_OPERATOR_EMAIL").filter(|s| !s.trim().is_empty()),
        }
    }

    /// Session for whoever runs the binary: admin when an operator email is
    /// configured, anonymous otherwise.
    pub fn operator_session(&self) -> Session {
        match &self.operator_email {
            Some(email) => Session::signed_in(User {
                uid: format!("operator:{email}"),
                email: Some(email.clone()),
                roles: vec![ADMIN_ROLE.to_string()],
            }),
            None => Session::anonymous(),
        }
    }
}
