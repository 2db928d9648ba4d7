mod availability;
mod conflict;
mod error;
mod mutations;
mod pricing;
mod queries;
mod store;

pub use availability::{
    expand_to_booked_dates, first_booked_in, is_date_booked, is_valid_selection, BookedDates,
};
pub use error::EngineError;
pub use pricing::{
    effective_base_price, price_for_date, price_for_range, price_stay, MissingPricePolicy,
    PricingPolicy, Rounding, DEFAULT_FALLBACK_PRICE,
};
pub use store::{place_reservation, ReservationStore};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedCabinState = Arc<RwLock<CabinState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit:
/// block for the first append, drain whatever else is queued, then one
/// fsync for the whole batch.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush failed for {} events: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so half-buffered bytes don't leak
    // into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// Persistence collaborator: cabins with their pricing and reservations,
/// durable through the WAL.
pub struct BookingEngine {
    pub state: DashMap<Ulid, SharedCabinState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: reservation id → cabin id
    pub(super) reservation_to_cabin: DashMap<Ulid, Ulid>,
    pub policy: PricingPolicy,
}

/// Apply an event to a cabin. The caller holds the write lock.
fn apply_to_cabin(cabin: &mut CabinState, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::PriceConfigUpdated { price_config, .. } => {
            cabin.price_config = price_config.clone();
        }
        Event::ReservationCreated {
            id,
            created_at,
            request,
        } => {
            cabin.insert_reservation(Reservation {
                id: *id,
                created_at: *created_at,
                request: request.clone(),
                status: request.status,
            });
            index.insert(*id, cabin.id);
        }
        Event::ReservationStatusChanged { id, status, .. } => {
            if let Some(r) = cabin.reservation_mut(*id) {
                r.status = *status;
            }
        }
        // Created/Deleted are handled at the DashMap level
        Event::CabinCreated { .. } | Event::CabinDeleted { .. } => {}
    }
}

impl BookingEngine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>, policy: PricingPolicy) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            notify,
            reservation_to_cabin: DashMap::new(),
            policy,
        };

        // Sole owner of every Arc during replay, so try_write never contends.
        // blocking_write would panic inside a runtime.
        for event in &events {
            match event {
                Event::CabinCreated {
                    id,
                    name,
                    price_config,
                } => {
                    let cabin = CabinState::new(*id, name.clone(), price_config.clone());
                    engine.state.insert(*id, Arc::new(RwLock::new(cabin)));
                }
                Event::CabinDeleted { id } => {
                    if let Some((_, cabin)) = engine.state.remove(id)
                        && let Ok(guard) = cabin.try_read()
                    {
                        for r in &guard.reservations {
                            engine.reservation_to_cabin.remove(&r.id);
                        }
                    }
                }
                other => {
                    if let Some(cabin_id) = event_cabin_id(other)
                        && let Some(entry) = engine.state.get(&cabin_id)
                    {
                        let cabin = entry.clone();
                        if let Ok(mut guard) = cabin.try_write() {
                            apply_to_cabin(&mut guard, other, &engine.reservation_to_cabin);
                        }
                    }
                }
            }
        }

        tracing::info!(
            "replayed {} events: {} cabins, {} reservations",
            events.len(),
            engine.state.len(),
            engine.reservation_to_cabin.len()
        );
        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_cabin_state(&self, id: &Ulid) -> Option<SharedCabinState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn get_cabin_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_to_cabin.get(reservation_id).map(|e| *e.value())
    }

    /// WAL-append, apply, notify.
    pub(super) async fn persist_and_apply(&self, cabin: &mut CabinState, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_cabin(cabin, event, &self.reservation_to_cabin);
        self.notify.send(cabin.id, event);
        Ok(())
    }

    /// Write lock on a live cabin. A cabin deleted while we waited for the
    /// lock is `NotFound`.
    pub(super) async fn cabin_write(&self, cabin_id: Ulid) -> Result<tokio::sync::OwnedRwLockWriteGuard<CabinState>, EngineError> {
        let cabin = self
            .get_cabin_state(&cabin_id)
            .ok_or(EngineError::NotFound(cabin_id))?;
        let guard = cabin.clone().write_owned().await;
        let still_live = self
            .state
            .get(&cabin_id)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), &cabin));
        if !still_live {
            return Err(EngineError::NotFound(cabin_id));
        }
        Ok(guard)
    }

    /// Lookup reservation → cabin, acquire the cabin's write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        reservation_id: &Ulid,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<CabinState>, EngineError> {
        let cabin_id = self
            .get_cabin_for_reservation(reservation_id)
            .ok_or(EngineError::NotFound(*reservation_id))?;
        self.cabin_write(cabin_id).await
    }
}

fn event_cabin_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::PriceConfigUpdated { id, .. } => Some(*id),
        Event::ReservationCreated { request, .. } => Some(request.cabin_id),
        Event::ReservationStatusChanged { cabin_id, .. } => Some(*cabin_id),
        Event::CabinCreated { .. } | Event::CabinDeleted { .. } => None,
    }
}
