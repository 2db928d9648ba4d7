use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::availability::{expand_to_booked_dates, BookedDates};
use super::conflict::validate_stay;
use super::pricing::price_stay;
use super::{BookingEngine, EngineError, SharedCabinState};

impl BookingEngine {
    /// Every cabin, sorted by id. Waits out in-flight writes instead of
    /// skipping locked cabins.
    pub async fn list_cabins(&self) -> Vec<CabinInfo> {
        let cabins: Vec<SharedCabinState> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut infos = Vec::with_capacity(cabins.len());
        for cabin in cabins {
            let guard = cabin.read().await;
            infos.push(CabinInfo {
                id: guard.id,
                name: guard.name.clone(),
                price_config: guard.price_config.clone(),
            });
        }
        infos.sort_by_key(|c| c.id);
        infos
    }

    pub async fn get_cabin(&self, id: Ulid) -> Result<CabinInfo, EngineError> {
        let cabin = self.get_cabin_state(&id).ok_or(EngineError::NotFound(id))?;
        let guard = cabin.read().await;
        Ok(CabinInfo {
            id: guard.id,
            name: guard.name.clone(),
            price_config: guard.price_config.clone(),
        })
    }

    /// Pending and confirmed stays of a cabin. Cancelled ones are filtered
    /// here, before booked-date expansion.
    pub async fn active_ranges(&self, cabin_id: Ulid) -> Result<Vec<StayRange>, EngineError> {
        let cabin = self
            .get_cabin_state(&cabin_id)
            .ok_or(EngineError::NotFound(cabin_id))?;
        let guard = cabin.read().await;
        Ok(guard.active_ranges())
    }

    pub async fn booked_dates(&self, cabin_id: Ulid) -> Result<BookedDates, EngineError> {
        let ranges = self.active_ranges(cabin_id).await?;
        Ok(expand_to_booked_dates(&ranges))
    }

    /// Price a stay with the cabin's current configuration.
    pub async fn quote(&self, cabin_id: Ulid, check_in: NaiveDate, check_out: NaiveDate) -> Result<Quote, EngineError> {
        let stay = StayRange::new(check_in, check_out)?;
        validate_stay(&stay)?;
        let cabin = self
            .get_cabin_state(&cabin_id)
            .ok_or(EngineError::NotFound(cabin_id))?;
        let guard = cabin.read().await;
        price_stay(&stay, &guard.price_config, &self.policy)
    }

    pub async fn list_reservations(&self, cabin_id: Ulid) -> Result<Vec<Reservation>, EngineError> {
        let cabin = self
            .get_cabin_state(&cabin_id)
            .ok_or(EngineError::NotFound(cabin_id))?;
        let guard = cabin.read().await;
        Ok(guard.reservations.clone())
    }

    pub async fn get_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let cabin_id = self
            .get_cabin_for_reservation(&id)
            .ok_or(EngineError::NotFound(id))?;
        let cabin = self
            .get_cabin_state(&cabin_id)
            .ok_or(EngineError::NotFound(cabin_id))?;
        let guard = cabin.read().await;
        guard
            .reservations
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(EngineError::NotFound(id))
    }
}
