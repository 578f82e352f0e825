use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    /// Catalog vehicle regardless of its listing flag. Retired ones are gone.
    pub async fn get_vehicle(&self, id: Ulid) -> Result<Vehicle, EngineError> {
        let handle = self.get_vehicle_state(&id).ok_or(EngineError::NotFound(id))?;
        let guard = handle.read().await;
        if guard.retired {
            return Err(EngineError::NotFound(id));
        }
        Ok(guard.vehicle.clone())
    }

    pub async fn list_owner_vehicles(&self, owner_id: &str) -> Vec<Vehicle> {
        let mut out = Vec::new();
        for (_, handle) in self.vehicle_handles() {
            let guard = handle.read().await;
            if !guard.retired && guard.vehicle.owner_id == owner_id {
                out.push(guard.vehicle.clone());
            }
        }
        out
    }

    /// Works for bookings of retired vehicles too.
    pub async fn get_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let vehicle_id = self.vehicle_for_booking(&id).ok_or(EngineError::NotFound(id))?;
        let handle = self
            .any_vehicle_state(&vehicle_id)
            .ok_or(EngineError::NotFound(id))?;
        let guard = handle.read().await;
        guard.booking(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Every booking of a catalog vehicle, ordered by start date.
    pub async fn list_vehicle_bookings(&self, vehicle_id: Ulid) -> Result<Vec<Booking>, EngineError> {
        let handle = self
            .get_vehicle_state(&vehicle_id)
            .ok_or(EngineError::NotFound(vehicle_id))?;
        let guard = handle.read().await;
        Ok(guard.bookings.clone())
    }

    /// A renter's bookings across live and retired vehicles, newest first.
    pub async fn list_renter_bookings(&self, renter_id: &str) -> Vec<Booking> {
        let mut handles = self.vehicle_handles();
        handles.extend(self.archive.iter().map(|e| (*e.key(), e.value().clone())));

        let mut out = Vec::new();
        for (_, handle) in handles {
            let guard = handle.read().await;
            out.extend(
                guard
                    .bookings
                    .iter()
                    .filter(|b| b.renter_id == renter_id)
                    .cloned(),
            );
        }
        out.sort_by(|a, b| b.id.cmp(&a.id));
        out
    }
}
