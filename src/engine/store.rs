use async_trait::async_trait;
use ulid::Ulid;

use crate::model::*;

use super::{BookingEngine, EngineError};

/// The boundary the booking flow talks to: fetch what is already booked,
/// hand over a new request, let staff move it along.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn active_ranges(&self, cabin_id: Ulid) -> Result<Vec<StayRange>, EngineError>;

    /// Unconditional insert.
    async fn create_reservation(&self, request: ReservationRequest) -> Result<Reservation, EngineError>;

    /// Atomic check-and-insert.
    async fn reserve_if_available(&self, request: ReservationRequest) -> Result<Reservation, EngineError>;

    async fn set_status(&self, reservation_id: Ulid, status: ReservationStatus) -> Result<(), EngineError>;
}

#[async_trait]
impl ReservationStore for BookingEngine {
    async fn active_ranges(&self, cabin_id: Ulid) -> Result<Vec<StayRange>, EngineError> {
        BookingEngine::active_ranges(self, cabin_id).await
    }

    async fn create_reservation(&self, request: ReservationRequest) -> Result<Reservation, EngineError> {
        BookingEngine::create_reservation(self, request).await
    }

    async fn reserve_if_available(&self, request: ReservationRequest) -> Result<Reservation, EngineError> {
        BookingEngine::reserve_if_available(self, request).await
    }

    async fn set_status(&self, reservation_id: Ulid, status: ReservationStatus) -> Result<(), EngineError> {
        BookingEngine::set_status(self, reservation_id, status).await.map(|_| ())
    }
}

/// Persist a submitted request, checked or not.
pub async fn place_reservation<S: ReservationStore + ?Sized>(
    store: &S,
    request: ReservationRequest,
    atomic: bool,
) -> Result<Reservation, EngineError> {
    if atomic {
        store.reserve_if_available(request).await
    } else {
        store.create_reservation(request).await
    }
}
