use chrono::NaiveDate;
use ulid::Ulid;

use crate::engine::{
    effective_base_price, expand_to_booked_dates, first_booked_in, price_stay, BookedDates,
    EngineError, PricingPolicy,
};
use crate::limits::*;
use crate::model::*;
use crate::selection::Selection;
use crate::session::Session;

/// State behind the booking widget for one cabin: booked days, the current
/// selection and the live quote. Produces a [`ReservationRequest`] on submit;
/// persisting it is the caller's job.
#[derive(Debug, Clone)]
pub struct BookingForm {
    cabin_id: Ulid,
    price_config: PriceConfig,
    policy: PricingPolicy,
    booked: BookedDates,
    selection: Selection,
}

impl BookingForm {
    pub fn new(cabin_id: Ulid, price_config: PriceConfig, policy: PricingPolicy, booked: BookedDates) -> Self {
        Self {
            cabin_id,
            price_config,
            policy,
            booked,
            selection: Selection::default(),
        }
    }

    /// Build from already-fetched active reservation ranges.
    pub fn from_ranges(cabin_id: Ulid, price_config: PriceConfig, policy: PricingPolicy, active: &[StayRange]) -> Self {
        Self::new(cabin_id, price_config, policy, expand_to_booked_dates(active))
    }

    pub fn cabin_id(&self) -> Ulid {
        self.cabin_id
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn booked(&self) -> &BookedDates {
        &self.booked
    }

    /// Swap in a freshly fetched booked set. The selection is kept.
    pub fn refresh_booked(&mut self, booked: BookedDates) {
        self.booked = booked;
    }

    pub fn click(&mut self, date: NaiveDate) -> Selection {
        self.selection = self.selection.click(date, &self.booked);
        self.selection
    }

    pub fn reset(&mut self) {
        self.selection = Selection::NoneSelected;
    }

    /// Quote for the current range; empty until both dates are chosen.
    pub fn quote(&self) -> Result<Quote, EngineError> {
        match self.selection.stay() {
            Some(stay) => price_stay(&stay, &self.price_config, &self.policy),
            None => Ok(Quote::default()),
        }
    }

    /// Validate the form and build a pending reservation request.
    pub fn submit(&self, guest: GuestInfo, session: &Session) -> Result<ReservationRequest, EngineError> {
        let stay = self
            .selection
            .stay()
            .ok_or(EngineError::Incomplete("check-in and check-out dates"))?;
        let guest = validate_guest(guest)?;
        if let Some(date) = first_booked_in(stay.check_in, stay.check_out, &self.booked) {
            return Err(EngineError::DatesUnavailable(date));
        }
        let quote = price_stay(&stay, &self.price_config, &self.policy)?;
        let base_price = effective_base_price(&self.price_config, &self.policy)?;
        let user = session.user();

        Ok(ReservationRequest {
            cabin_id: self.cabin_id,
            stay,
            quote,
            base_price,
            guest,
            user_id: user.map(|u| u.uid.clone()),
            user_email: user.and_then(|u| u.email.clone()),
            status: ReservationStatus::Pending,
        })
    }
}

/// Trim contact fields and enforce required ones.
pub fn validate_guest(mut guest: GuestInfo) -> Result<GuestInfo, EngineError> {
    guest.name = guest.name.trim().to_string();
    guest.email = guest.email.trim().to_string();
    guest.phone = guest.phone.trim().to_string();
    if guest.name.is_empty() {
        return Err(EngineError::Incomplete("guest name"));
    }
    if guest.email.is_empty() {
        return Err(EngineError::Incomplete("guest email"));
    }
    if guest.name.len() > MAX_CONTACT_FIELD_LEN
        || guest.email.len() > MAX_CONTACT_FIELD_LEN
        || guest.phone.len() > MAX_CONTACT_FIELD_LEN
    {
        return Err(EngineError::LimitExceeded("contact field too long"));
    }
    if guest.special_requests.len() > MAX_SPECIAL_REQUESTS_LEN {
        return Err(EngineError::LimitExceeded("special requests too long"));
    }
    if guest.guest_count == 0 || guest.guest_count > MAX_GUESTS {
        return Err(EngineError::InvalidGuestCount(guest.guest_count));
    }
    Ok(guest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    use crate::session::User;

    fn guest() -> GuestInfo {
        GuestInfo {
            name: " Lucía Pérez ".into(),
            email: "lucia@example.com".into(),
            phone: "+54 9 294 000 0000".into(),
            guest_count: 3,
            special_requests: "Cuna para bebé".into(),
        }
    }

    fn form() -> BookingForm {
        let config = PriceConfig::new(Decimal::from(100)).with_rule(
            SeasonRule::date_range("Alta", Decimal::TWO, ymd(2025, 1, 1), ymd(2025, 1, 15)).unwrap(),
        );
        let existing = [StayRange::new(ymd(2025, 1, 20), ymd(2025, 1, 22)).unwrap()];
        BookingForm::from_ranges(Ulid::new(), config, PricingPolicy::default(), &existing)
    }

    #[test]
    fn quote_empty_until_range_selected() {
        let mut f = form();
        assert_eq!(f.quote().unwrap(), Quote::default());
        f.click(ymd(2025, 1, 14));
        assert_eq!(f.quote().unwrap().nights, 0);
        f.click(ymd(2025, 1, 16));
        let q = f.quote().unwrap();
        assert_eq!(q.nights, 2);
        assert_eq!(q.total, Decimal::from(400));
    }

    #[test]
    fn submit_builds_pending_request() {
        let mut f = form();
        f.click(ymd(2025, 1, 14));
        f.click(ymd(2025, 1, 16));
        let session = Session::signed_in(User {
            uid: "abc".into(),
            email: Some("lucia@example.com".into()),
            roles: vec![],
        });
        let req = f.submit(guest(), &session).unwrap();
        assert_eq!(req.status, ReservationStatus::Pending);
        assert_eq!(req.cabin_id, f.cabin_id());
        assert_eq!(req.quote.total, Decimal::from(400));
        assert_eq!(req.base_price, Decimal::from(100));
        assert_eq!(req.guest.name, "Lucía Pérez");
        assert_eq!(req.user_id.as_deref(), Some("abc"));
    }

    #[test]
    fn anonymous_submit_has_no_user() {
        let mut f = form();
        f.click(ymd(2025, 2, 1));
        f.click(ymd(2025, 2, 3));
        let req = f.submit(guest(), &Session::anonymous()).unwrap();
        assert!(req.user_id.is_none());
        assert!(req.user_email.is_none());
    }

    #[test]
    fn submit_requires_dates() {
        let mut f = form();
        f.click(ymd(2025, 2, 1));
        let err = f.submit(guest(), &Session::anonymous()).unwrap_err();
        assert!(matches!(err, EngineError::Incomplete(_)));
    }

    #[test]
    fn submit_requires_name_and_email() {
        let mut f = form();
        f.click(ymd(2025, 2, 1));
        f.click(ymd(2025, 2, 3));
        let mut g = guest();
        g.email = "   ".into();
        assert!(matches!(
            f.submit(g, &Session::anonymous()),
            Err(EngineError::Incomplete("guest email"))
        ));
        let mut g = guest();
        g.name.clear();
        assert!(matches!(
            f.submit(g, &Session::anonymous()),
            Err(EngineError::Incomplete("guest name"))
        ));
    }

    #[test]
    fn submit_rejects_zero_guests() {
        let mut f = form();
        f.click(ymd(2025, 2, 1));
        f.click(ymd(2025, 2, 3));
        let mut g = guest();
        g.guest_count = 0;
        assert!(matches!(
            f.submit(g, &Session::anonymous()),
            Err(EngineError::InvalidGuestCount(0))
        ));
    }

    #[test]
    fn submit_rejects_range_spanning_booking() {
        let mut f = form();
        // Both ends free, but Jan 20-22 is booked in between.
        f.click(ymd(2025, 1, 18));
        f.click(ymd(2025, 1, 25));
        let err = f.submit(guest(), &Session::anonymous()).unwrap_err();
        assert!(matches!(err, EngineError::DatesUnavailable(d) if d == ymd(2025, 1, 20)));
    }

    #[test]
    fn checkout_on_existing_checkin_rejected() {
        let mut f = form();
        f.click(ymd(2025, 1, 18));
        // Jan 20 is booked, so the click is ignored.
        f.click(ymd(2025, 1, 20));
        assert_eq!(f.selection(), Selection::CheckInSelected { check_in: ymd(2025, 1, 18) });
    }

    #[test]
    fn refresh_booked_catches_stale_selection() {
        let mut f = form();
        f.click(ymd(2025, 3, 1));
        f.click(ymd(2025, 3, 4));
        let newer = expand_to_booked_dates(&[StayRange::new(ymd(2025, 3, 2), ymd(2025, 3, 3)).unwrap()]);
        f.refresh_booked(newer);
        assert!(f.submit(guest(), &Session::anonymous()).is_err());
        f.reset();
        assert_eq!(f.selection(), Selection::NoneSelected);
    }
}
