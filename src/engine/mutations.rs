use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::booking::validate_guest;
use crate::limits::*;
use crate::model::*;

use super::conflict::{check_available, now_ms, validate_quote, validate_stay};
use super::pricing::price_stay;
use super::{BookingEngine, EngineError, WalCommand};

impl BookingEngine {
    pub async fn create_cabin(&self, id: Ulid, name: String, price_config: PriceConfig) -> Result<(), EngineError> {
        if self.state.len() >= MAX_CABINS {
            return Err(EngineError::LimitExceeded("too many cabins"));
        }
        if name.trim().is_empty() {
            return Err(EngineError::Incomplete("cabin name"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("cabin name too long"));
        }
        price_config.validate()?;
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::CabinCreated {
            id,
            name: name.clone(),
            price_config: price_config.clone(),
        };
        self.wal_append(&event).await?;
        self.state
            .insert(id, Arc::new(RwLock::new(CabinState::new(id, name, price_config))));
        self.notify.send(id, &event);
        tracing::info!("created cabin {id}");
        Ok(())
    }

    /// Refused while the cabin still has pending or confirmed reservations.
    pub async fn delete_cabin(&self, id: Ulid) -> Result<(), EngineError> {
        let guard = self.cabin_write(id).await?;
        if guard.has_active_reservations() {
            return Err(EngineError::HasActiveReservations(id));
        }

        let event = Event::CabinDeleted { id };
        self.wal_append(&event).await?;
        for r in &guard.reservations {
            self.reservation_to_cabin.remove(&r.id);
        }
        // Remove while still holding the lock so queued writers see it gone.
        self.state.remove(&id);
        drop(guard);
        self.notify.send(id, &event);
        self.notify.remove(&id);
        tracing::info!("deleted cabin {id}");
        Ok(())
    }

    /// Replace the whole price configuration. Rules are re-validated so a
    /// malformed one never reaches pricing.
    pub async fn update_price_config(&self, id: Ulid, price_config: PriceConfig) -> Result<(), EngineError> {
        price_config.validate()?;
        let mut guard = self.cabin_write(id).await?;
        let event = Event::PriceConfigUpdated { id, price_config };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Append a rule at the end of the evaluation order.
    pub async fn add_season_rule(&self, id: Ulid, rule: SeasonRule) -> Result<(), EngineError> {
        rule.validate()?;
        let mut guard = self.cabin_write(id).await?;
        let mut price_config = guard.price_config.clone();
        price_config.season_rules.push(rule);
        price_config.validate()?;
        let event = Event::PriceConfigUpdated { id, price_config };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Remove the rule at `index`, returning it.
    pub async fn remove_season_rule(&self, id: Ulid, index: usize) -> Result<SeasonRule, EngineError> {
        let mut guard = self.cabin_write(id).await?;
        let mut price_config = guard.price_config.clone();
        if index >= price_config.season_rules.len() {
            return Err(EngineError::LimitExceeded("season rule index out of range"));
        }
        let removed = price_config.season_rules.remove(index);
        let event = Event::PriceConfigUpdated { id, price_config };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(removed)
    }

    /// Store a reservation request without re-checking availability. Two
    /// concurrent callers that both validated against a stale booked set
    /// will both succeed here.
    pub async fn create_reservation(&self, request: ReservationRequest) -> Result<Reservation, EngineError> {
        self.insert_reservation(request, false).await
    }

    /// Check-and-insert under the cabin's write lock: rejects with
    /// `DatesUnavailable` when any day of the closed stay interval is
    /// already booked by an active reservation.
    pub async fn reserve_if_available(&self, request: ReservationRequest) -> Result<Reservation, EngineError> {
        self.insert_reservation(request, true).await
    }

    async fn insert_reservation(&self, request: ReservationRequest, checked: bool) -> Result<Reservation, EngineError> {
        validate_stay(&request.stay)?;
        if request.status != ReservationStatus::Pending {
            return Err(EngineError::InvalidTransition {
                from: ReservationStatus::Pending,
                to: request.status,
            });
        }
        let mut request = request;
        request.guest = validate_guest(request.guest)?;

        let cabin_id = request.cabin_id;
        let mut guard = self.cabin_write(cabin_id).await?;
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_CABIN {
            return Err(EngineError::LimitExceeded("too many reservations on cabin"));
        }
        if checked
            && let Err(e) = check_available(&guard, &request.stay)
        {
            metrics::counter!(crate::observability::RESERVATION_CONFLICTS_TOTAL).increment(1);
            tracing::warn!("reservation on cabin {cabin_id} rejected: {e}");
            return Err(e);
        }
        if request.quote == Quote::default() {
            request.quote = price_stay(&request.stay, &guard.price_config, &self.policy)?;
        } else {
            validate_quote(&request.stay, &request.quote)?;
        }

        let id = Ulid::new();
        let created_at = now_ms();
        let event = Event::ReservationCreated {
            id,
            created_at,
            request: request.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::RESERVATIONS_CREATED_TOTAL).increment(1);
        tracing::info!(
            "reservation {id} on cabin {cabin_id}: {} → {} ({} nights)",
            request.stay.check_in,
            request.stay.check_out,
            request.quote.nights
        );

        Ok(Reservation {
            id,
            created_at,
            status: request.status,
            request,
        })
    }

    /// Staff transition. Cancelled is terminal; re-confirming a confirmed
    /// reservation is a no-op write.
    pub async fn set_status(&self, reservation_id: Ulid, status: ReservationStatus) -> Result<Ulid, EngineError> {
        let mut guard = self.resolve_reservation_write(&reservation_id).await?;
        let current = guard
            .reservations
            .iter()
            .find(|r| r.id == reservation_id)
            .map(|r| r.status)
            .ok_or(EngineError::NotFound(reservation_id))?;

        match (current, status) {
            (ReservationStatus::Cancelled, to) if to != ReservationStatus::Cancelled => {
                return Err(EngineError::InvalidTransition { from: current, to });
            }
            (ReservationStatus::Confirmed, ReservationStatus::Pending) => {
                return Err(EngineError::InvalidTransition {
                    from: current,
                    to: status,
                });
            }
            _ => {}
        }

        let cabin_id = guard.id;
        let event = Event::ReservationStatusChanged {
            id: reservation_id,
            cabin_id,
            status,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!("reservation {reservation_id}: {current} → {status}");
        Ok(cabin_id)
    }

    /// Rewrite the WAL with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();
        let cabins: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        for cabin in cabins {
            let guard = cabin.read().await;
            events.push(Event::CabinCreated {
                id: guard.id,
                name: guard.name.clone(),
                price_config: guard.price_config.clone(),
            });
            for r in &guard.reservations {
                events.push(Event::ReservationCreated {
                    id: r.id,
                    created_at: r.created_at,
                    request: r.request.clone(),
                });
                if r.status != r.request.status {
                    events.push(Event::ReservationStatusChanged {
                        id: r.id,
                        cabin_id: guard.id,
                        status: r.status,
                    });
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
