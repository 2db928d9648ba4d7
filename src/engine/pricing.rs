use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::limits::MAX_STAY_NIGHTS;
use crate::model::*;

use super::EngineError;

/// What to do when a cabin has no usable base price (missing or `<= 0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingPricePolicy {
    /// Price every night at this flat amount, ignoring season rules.
    Fallback(Decimal),
    /// Refuse to price the cabin.
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rounding {
    /// Keep `base * multiplier` as computed.
    #[default]
    Exact,
    /// Round each night to whole currency units, halves away from zero.
    WholeUnits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    pub missing_price: MissingPricePolicy,
    pub rounding: Rounding,
}

pub const DEFAULT_FALLBACK_PRICE: Decimal = Decimal::ONE_HUNDRED;

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            missing_price: MissingPricePolicy::Fallback(DEFAULT_FALLBACK_PRICE),
            rounding: Rounding::Exact,
        }
    }
}

impl PricingPolicy {
    fn round(&self, price: Decimal) -> Decimal {
        match self.rounding {
            Rounding::Exact => price,
            Rounding::WholeUnits => {
                price.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            }
        }
    }
}

/// The configured base price if usable, `None` when the missing-price policy applies.
fn usable_base(config: &PriceConfig) -> Option<Decimal> {
    config.base_price.filter(|p| *p > Decimal::ZERO)
}

/// Base price shown next to a cabin in listings.
pub fn effective_base_price(config: &PriceConfig, policy: &PricingPolicy) -> Result<Decimal, EngineError> {
    match (usable_base(config), policy.missing_price) {
        (Some(base), _) => Ok(base),
        (None, MissingPricePolicy::Fallback(p)) => Ok(p),
        (None, MissingPricePolicy::Reject) => Err(EngineError::MissingBasePrice),
    }
}

/// Price one night.
///
/// Rules are evaluated in list order and the highest candidate wins; a later
/// rule only replaces the current winner when strictly more expensive, so
/// equal prices keep the earlier rule's name.
pub fn price_for_date(
    date: NaiveDate,
    config: &PriceConfig,
    policy: &PricingPolicy,
) -> Result<NightlyPrice, EngineError> {
    let Some(base) = usable_base(config) else {
        let fallback = effective_base_price(config, policy)?;
        tracing::warn!(%date, %fallback, "no usable base price, using fallback");
        return Ok(NightlyPrice {
            date,
            price: policy.round(fallback),
            applied_rule: BASE_LABEL.to_string(),
            is_override: false,
        });
    };

    let mut best = base;
    let mut applied: Option<&SeasonRule> = None;
    for rule in &config.season_rules {
        if !rule.matches(date) {
            continue;
        }
        let candidate = base * rule.multiplier();
        if candidate > best {
            best = candidate;
            applied = Some(rule);
        }
    }

    Ok(NightlyPrice {
        date,
        price: policy.round(best),
        applied_rule: applied.map_or(BASE_LABEL, |r| r.name()).to_string(),
        is_override: best != base,
    })
}

/// Price every night of `[check_in, check_out)`.
pub fn price_for_range(
    check_in: NaiveDate,
    check_out: NaiveDate,
    config: &PriceConfig,
    policy: &PricingPolicy,
) -> Result<Quote, EngineError> {
    let stay = StayRange::new(check_in, check_out)?;
    price_stay(&stay, config, policy)
}

pub fn price_stay(stay: &StayRange, config: &PriceConfig, policy: &PricingPolicy) -> Result<Quote, EngineError> {
    let nights = stay.nights();
    if nights > MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    let breakdown = stay
        .nights_iter()
        .map(|date| price_for_date(date, config, policy))
        .collect::<Result<Vec<_>, _>>()?;
    let total = breakdown.iter().map(|n| n.price).sum();
    metrics::counter!(crate::observability::QUOTES_TOTAL).increment(1);
    Ok(Quote {
        nights,
        total,
        breakdown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    fn alta() -> SeasonRule {
        SeasonRule::date_range("Alta", Decimal::TWO, ymd(2025, 1, 1), ymd(2025, 1, 15)).unwrap()
    }

    fn finde(multiplier: Decimal) -> SeasonRule {
        // Friday + Saturday
        SeasonRule::weekdays("Fin de semana", multiplier, vec![5, 6]).unwrap()
    }

    fn policy() -> PricingPolicy {
        PricingPolicy::default()
    }

    #[test]
    fn no_rules_gives_base() {
        let config = PriceConfig::new(dec(100));
        let n = price_for_date(ymd(2025, 6, 1), &config, &policy()).unwrap();
        assert_eq!(n.price, dec(100));
        assert_eq!(n.applied_rule, BASE_LABEL);
        assert!(!n.is_override);
    }

    #[test]
    fn unmatched_date_gives_base() {
        let config = PriceConfig::new(dec(100)).with_rule(alta());
        // 2025-01-16 is a Thursday, just past the range end.
        let n = price_for_date(ymd(2025, 1, 16), &config, &policy()).unwrap();
        assert_eq!(n.price, dec(100));
        assert_eq!(n.applied_rule, "Base");
    }

    #[test]
    fn single_rule_multiplies_base() {
        let config = PriceConfig::new(dec(80)).with_rule(finde(Decimal::new(125, 2)));
        // 2025-03-07 is a Friday.
        let n = price_for_date(ymd(2025, 3, 7), &config, &policy()).unwrap();
        assert_eq!(n.price, dec(100));
        assert_eq!(n.applied_rule, "Fin de semana");
        assert!(n.is_override);
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let config = PriceConfig::new(dec(100)).with_rule(alta());
        for d in [ymd(2025, 1, 1), ymd(2025, 1, 15)] {
            assert_eq!(price_for_date(d, &config, &policy()).unwrap().price, dec(200));
        }
        assert_eq!(
            price_for_date(ymd(2024, 12, 31), &config, &policy()).unwrap().price,
            dec(100)
        );
    }

    #[test]
    fn overlapping_rules_pick_highest_regardless_of_order() {
        // Saturday 2025-01-11 is inside Alta and a weekend day.
        let sat = ymd(2025, 1, 11);
        let weekend_cheap = finde(Decimal::new(15, 1));
        let weekend_dear = finde(Decimal::from(3));

        let first_wins = PriceConfig::new(dec(100)).with_rule(alta()).with_rule(weekend_cheap.clone());
        let n = price_for_date(sat, &first_wins, &policy()).unwrap();
        assert_eq!(n.price, dec(200));
        assert_eq!(n.applied_rule, "Alta");

        let last_wins = PriceConfig::new(dec(100)).with_rule(alta()).with_rule(weekend_dear.clone());
        let n = price_for_date(sat, &last_wins, &policy()).unwrap();
        assert_eq!(n.price, dec(300));
        assert_eq!(n.applied_rule, "Fin de semana");

        let middle = SeasonRule::weekdays("Sábado", Decimal::new(25, 1), vec![6]).unwrap();
        let three = PriceConfig::new(dec(100))
            .with_rule(weekend_cheap)
            .with_rule(middle)
            .with_rule(alta());
        let n = price_for_date(sat, &three, &policy()).unwrap();
        assert_eq!(n.price, dec(250));
        assert_eq!(n.applied_rule, "Sábado");
    }

    #[test]
    fn equal_candidates_keep_first_rule() {
        let sat = ymd(2025, 1, 11);
        let config = PriceConfig::new(dec(100))
            .with_rule(finde(Decimal::TWO))
            .with_rule(alta());
        let n = price_for_date(sat, &config, &policy()).unwrap();
        assert_eq!(n.applied_rule, "Fin de semana");
    }

    #[test]
    fn multiplier_of_one_is_not_an_override() {
        let rule = SeasonRule::weekdays("Neutral", Decimal::ONE, vec![0, 1, 2, 3, 4, 5, 6]).unwrap();
        let config = PriceConfig::new(dec(100)).with_rule(rule);
        let n = price_for_date(ymd(2025, 5, 5), &config, &policy()).unwrap();
        assert_eq!(n.price, dec(100));
        assert_eq!(n.applied_rule, "Base");
        assert!(!n.is_override);
    }

    #[test]
    fn missing_base_uses_fallback() {
        let config = PriceConfig {
            base_price: None,
            season_rules: vec![alta()],
        };
        let n = price_for_date(ymd(2025, 1, 5), &config, &policy()).unwrap();
        assert_eq!(n.price, dec(100));
        assert_eq!(n.applied_rule, "Base");

        let zero = PriceConfig {
            base_price: Some(Decimal::ZERO),
            season_rules: Vec::new(),
        };
        let n = price_for_date(ymd(2025, 1, 5), &zero, &policy()).unwrap();
        assert_eq!(n.price, dec(100));
    }

    #[test]
    fn missing_base_rejected_when_configured() {
        let strict = PricingPolicy {
            missing_price: MissingPricePolicy::Reject,
            ..PricingPolicy::default()
        };
        let config = PriceConfig {
            base_price: Some(dec(-5)),
            season_rules: Vec::new(),
        };
        let err = price_for_date(ymd(2025, 1, 5), &config, &strict).unwrap_err();
        assert!(matches!(err, EngineError::MissingBasePrice));
        assert!(price_for_range(ymd(2025, 1, 5), ymd(2025, 1, 6), &config, &strict).is_err());
    }

    #[test]
    fn whole_unit_rounding() {
        let whole = PricingPolicy {
            rounding: Rounding::WholeUnits,
            ..PricingPolicy::default()
        };
        let config = PriceConfig::new(Decimal::new(8550, 2)).with_rule(finde(Decimal::new(15, 1)));
        // Friday: 85.50 * 1.5 = 128.25
        let fri = ymd(2025, 3, 7);
        assert_eq!(price_for_date(fri, &config, &policy()).unwrap().price, Decimal::new(12825, 2));
        assert_eq!(price_for_date(fri, &config, &whole).unwrap().price, dec(128));
        // Thursday: 85.50 rounds half away from zero.
        assert_eq!(price_for_date(ymd(2025, 3, 6), &config, &whole).unwrap().price, dec(86));
    }

    #[test]
    fn one_night_range_matches_single_date() {
        let config = PriceConfig::new(dec(100)).with_rule(alta()).with_rule(finde(Decimal::from(3)));
        let d = ymd(2025, 1, 10);
        let q = price_for_range(d, ymd(2025, 1, 11), &config, &policy()).unwrap();
        assert_eq!(q.nights, 1);
        assert_eq!(q.breakdown, vec![price_for_date(d, &config, &policy()).unwrap()]);
        assert_eq!(q.total, q.breakdown[0].price);
    }

    #[test]
    fn checkout_night_not_charged() {
        let config = PriceConfig::new(dec(100)).with_rule(alta());
        let q = price_for_range(ymd(2025, 1, 14), ymd(2025, 1, 16), &config, &policy()).unwrap();
        assert_eq!(q.nights, 2);
        assert_eq!(q.total, dec(400));
        let summary: Vec<_> = q
            .breakdown
            .iter()
            .map(|n| (n.date, n.price, n.applied_rule.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (ymd(2025, 1, 14), dec(200), "Alta"),
                (ymd(2025, 1, 15), dec(200), "Alta"),
            ]
        );
    }

    #[test]
    fn range_straddling_season_end() {
        let config = PriceConfig::new(dec(100)).with_rule(alta());
        let q = price_for_range(ymd(2025, 1, 15), ymd(2025, 1, 17), &config, &policy()).unwrap();
        assert_eq!(q.total, dec(300));
        assert!(q.breakdown[0].is_override);
        assert!(!q.breakdown[1].is_override);
    }

    #[test]
    fn total_is_sum_of_breakdown_for_long_stays() {
        let config = PriceConfig::new(Decimal::new(9999, 2))
            .with_rule(alta())
            .with_rule(finde(Decimal::new(135, 2)));
        let start = ymd(2025, 1, 1);
        for nights in [1u64, 7, 30, 180, 365] {
            let q = price_for_range(start, add_days(start, nights), &config, &policy()).unwrap();
            assert_eq!(q.nights as u64, nights);
            assert_eq!(q.breakdown.len() as u64, nights);
            let sum: Decimal = q.breakdown.iter().map(|n| n.price).sum();
            assert_eq!(q.total, sum);
            assert!(q.breakdown.windows(2).all(|w| w[0].date < w[1].date));
        }
    }

    #[test]
    fn invalid_range_rejected() {
        let config = PriceConfig::new(dec(100));
        let d = ymd(2025, 1, 10);
        assert!(matches!(
            price_for_range(d, d, &config, &policy()),
            Err(EngineError::InvalidRange { .. })
        ));
        assert!(price_for_range(d, ymd(2025, 1, 9), &config, &policy()).is_err());
    }

    #[test]
    fn stay_over_a_year_rejected() {
        let config = PriceConfig::new(dec(100));
        let start = ymd(2025, 1, 1);
        let err = price_for_range(start, add_days(start, 366), &config, &policy()).unwrap_err();
        assert!(matches!(err, EngineError::LimitExceeded(_)));
    }

    #[test]
    fn effective_base_follows_policy() {
        let none = PriceConfig::default();
        assert_eq!(effective_base_price(&none, &policy()).unwrap(), dec(100));
        let strict = PricingPolicy {
            missing_price: MissingPricePolicy::Reject,
            rounding: Rounding::Exact,
        };
        assert!(effective_base_price(&none, &strict).is_err());
        assert_eq!(effective_base_price(&PriceConfig::new(dec(70)), &strict).unwrap(), dec(70));
    }
}
