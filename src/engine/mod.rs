mod catalog;
mod conflict;
mod error;
mod lifecycle;
mod queries;
mod search;

pub use conflict::{has_conflict_in, list_conflicts_in};
pub use error::EngineError;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::cache::{Invalidator, ResultCache};
use crate::model::*;
use crate::notify::NotifyHub;
use crate::storage::Storage;

/// One vehicle and its ledger slice. The write lock is the serialization point
/// for every booking mutation on that vehicle.
pub type SharedVehicleState = Arc<RwLock<VehicleState>>;

pub struct Engine {
    /// Listed and unlisted vehicles. Search and booking creation look here only.
    pub(super) catalog: DashMap<Ulid, SharedVehicleState>,
    /// Retired vehicles, kept so their booking history stays addressable.
    pub(super) archive: DashMap<Ulid, SharedVehicleState>,
    /// Reverse lookup: booking id → vehicle id.
    pub(super) booking_to_vehicle: DashMap<Ulid, Ulid>,
    /// Mutations hold this shared for their whole persist+apply; compaction
    /// holds it exclusively. Always taken before any vehicle lock.
    pub(super) ledger_gate: RwLock<()>,
    pub(super) storage: Arc<dyn Storage>,
    pub(super) cache: Arc<ResultCache>,
    pub(super) invalidator: Arc<dyn Invalidator>,
    pub notify: Arc<NotifyHub>,
}

/// Apply an event to a vehicle's state. Caller holds the write lock.
fn apply_to_vehicle(vs: &mut VehicleState, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::VehicleUpdated { vehicle } => vs.vehicle = vehicle.clone(),
        Event::VehicleRetired { .. } => vs.retired = true,
        Event::BookingCreated { booking } => {
            index.insert(booking.id, booking.car_id);
            vs.insert_booking(booking.clone());
        }
        Event::BookingStatusChanged { id, status, at, .. } => {
            if let Some(b) = vs.booking_mut(*id) {
                b.status = *status;
                b.updated_at = *at;
            }
        }
        Event::PaymentStatusChanged {
            id,
            payment_status,
            at,
            ..
        } => {
            if let Some(b) = vs.booking_mut(*id) {
                b.payment_status = *payment_status;
                b.updated_at = *at;
            }
        }
        // Inserted into the catalog map, not into an existing state.
        Event::VehicleCreated { .. } => {}
    }
}

impl Engine {
    /// Build the engine and replay the ledger. Returns only once state is
    /// fully loaded, so callers can gate readiness on it.
    pub async fn open(
        storage: Arc<dyn Storage>,
        cache: Arc<ResultCache>,
        notify: Arc<NotifyHub>,
    ) -> Result<Self, EngineError> {
        let events = storage.load().await?;
        let invalidator: Arc<dyn Invalidator> = cache.clone();
        let engine = Self {
            catalog: DashMap::new(),
            archive: DashMap::new(),
            booking_to_vehicle: DashMap::new(),
            ledger_gate: RwLock::new(()),
            storage,
            cache,
            invalidator,
            notify,
        };

        for event in &events {
            engine.replay_event(event);
        }
        tracing::info!(
            events = events.len(),
            vehicles = engine.catalog.len(),
            retired = engine.archive.len(),
            bookings = engine.booking_to_vehicle.len(),
            "ledger replayed"
        );
        metrics::gauge!(crate::observability::VEHICLES_ACTIVE).set(engine.catalog.len() as f64);
        Ok(engine)
    }

    /// We are the only owner of these locks during replay, so `try_write`
    /// always succeeds. Never block here: this runs inside the runtime.
    fn replay_event(&self, event: &Event) {
        if let Event::VehicleCreated { vehicle } = event {
            let vs = VehicleState::new(vehicle.clone());
            self.catalog.insert(vehicle.id, Arc::new(RwLock::new(vs)));
            return;
        }
        let vehicle_id = event.vehicle_id();
        let Some(handle) = self.any_vehicle_state(&vehicle_id) else {
            tracing::warn!(event = event.label(), %vehicle_id, "replay: event for unknown vehicle");
            return;
        };
        match handle.try_write() {
            Ok(mut guard) => apply_to_vehicle(&mut guard, event, &self.booking_to_vehicle),
            Err(_) => {
                tracing::error!(%vehicle_id, "replay: vehicle state unexpectedly locked");
                return;
            }
        }
        if matches!(event, Event::VehicleRetired { .. }) {
            self.move_to_archive(vehicle_id);
        }
    }

    pub(super) fn move_to_archive(&self, id: Ulid) {
        if let Some((id, handle)) = self.catalog.remove(&id) {
            self.archive.insert(id, handle);
        }
        metrics::gauge!(crate::observability::VEHICLES_ACTIVE).set(self.catalog.len() as f64);
    }

    /// Catalog vehicle (listed or not). Retired vehicles are not returned.
    pub fn get_vehicle_state(&self, id: &Ulid) -> Option<SharedVehicleState> {
        self.catalog.get(id).map(|e| e.value().clone())
    }

    /// Catalog or archive.
    pub(super) fn any_vehicle_state(&self, id: &Ulid) -> Option<SharedVehicleState> {
        self.get_vehicle_state(id)
            .or_else(|| self.archive.get(id).map(|e| e.value().clone()))
    }

    pub fn vehicle_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_vehicle.get(booking_id).map(|e| *e.value())
    }

    /// Resolve a booking id to its vehicle and take the write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<VehicleState>, EngineError> {
        let vehicle_id = self
            .vehicle_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let handle = self
            .any_vehicle_state(&vehicle_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        Ok(handle.write_owned().await)
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn vehicle_count(&self) -> usize {
        self.catalog.len()
    }

    /// Snapshot of catalog handles in id order. The map guard is released
    /// before anyone awaits a vehicle lock.
    pub(super) fn vehicle_handles(&self) -> Vec<(Ulid, SharedVehicleState)> {
        collect_sorted(&self.catalog)
    }

    /// Persist, apply, invalidate, notify. If storage fails nothing changes.
    pub(super) async fn persist_and_apply(
        &self,
        vs: &mut VehicleState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.persist(event).await?;
        apply_to_vehicle(vs, event, &self.booking_to_vehicle);
        self.after_commit(event);
        Ok(())
    }

    pub(super) async fn persist(&self, event: &Event) -> Result<(), EngineError> {
        self.storage.append(event).await.map_err(|e| {
            tracing::error!(event = event.label(), error = %e, "ledger append failed");
            EngineError::Storage(e.to_string())
        })
    }

    pub(super) fn after_commit(&self, event: &Event) {
        self.invalidator.invalidate_all();
        self.notify.send(event.vehicle_id(), event);
    }

    /// Rewrite the ledger with the minimum events that rebuild current state.
    pub async fn compact_ledger(&self) -> Result<(), EngineError> {
        let _exclusive = self.ledger_gate.write().await;
        let mut events = Vec::new();
        let live = collect_sorted(&self.catalog);
        let retired = collect_sorted(&self.archive);
        for (handles, retired) in [(live, false), (retired, true)] {
            for (id, handle) in handles {
                let guard = handle.read().await;
                events.push(Event::VehicleCreated {
                    vehicle: guard.vehicle.clone(),
                });
                events.extend(
                    guard
                        .bookings
                        .iter()
                        .map(|b| Event::BookingCreated { booking: b.clone() }),
                );
                if retired {
                    events.push(Event::VehicleRetired { id });
                }
            }
        }
        let count = events.len();
        self.storage.compact(events).await?;
        tracing::info!(events = count, "ledger compacted");
        Ok(())
    }

    pub async fn ledger_appends_since_compact(&self) -> u64 {
        self.storage.appends_since_compact().await
    }
}

fn collect_sorted(map: &DashMap<Ulid, SharedVehicleState>) -> Vec<(Ulid, SharedVehicleState)> {
    let mut handles: Vec<_> = map.iter().map(|e| (*e.key(), e.value().clone())).collect();
    handles.sort_by_key(|(id, _)| *id);
    handles
}
