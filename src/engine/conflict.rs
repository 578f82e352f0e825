use ulid::Ulid;

use crate::limits::MAX_BOOKING_DAYS;
use crate::model::*;

use super::{Engine, EngineError};

pub(crate) fn validate_range(range: &DateRange) -> Result<(), EngineError> {
    if range.days() > MAX_BOOKING_DAYS {
        return Err(EngineError::LimitExceeded("booking range too long"));
    }
    Ok(())
}

/// Live bookings of this vehicle that overlap `range` (inclusive test).
/// Cancelled bookings never conflict.
pub fn list_conflicts_in<'a>(
    vs: &'a VehicleState,
    range: &'a DateRange,
) -> impl Iterator<Item = &'a Booking> + 'a {
    vs.candidates(range)
        .filter(move |b| b.status.blocks_dates() && b.dates().overlaps(range))
}

/// Stops at the first overlapping live booking.
pub fn has_conflict_in(vs: &VehicleState, range: &DateRange) -> bool {
    list_conflicts_in(vs, range).next().is_some()
}

pub(crate) fn check_no_conflict(vs: &VehicleState, range: &DateRange) -> Result<(), EngineError> {
    let conflicting: Vec<Ulid> = list_conflicts_in(vs, range).map(|b| b.id).collect();
    if conflicting.is_empty() {
        return Ok(());
    }
    Err(EngineError::DatesUnavailable {
        car_id: vs.vehicle.id,
        range: *range,
        conflicting,
    })
}

impl Engine {
    /// Whether any live booking on the vehicle overlaps the range.
    pub async fn has_conflict(&self, vehicle_id: Ulid, range: DateRange) -> Result<bool, EngineError> {
        let handle = self
            .get_vehicle_state(&vehicle_id)
            .ok_or(EngineError::NotFound(vehicle_id))?;
        let guard = handle.read().await;
        Ok(has_conflict_in(&guard, &range))
    }

    /// Every live booking on the vehicle that overlaps the range.
    pub async fn list_conflicts(
        &self,
        vehicle_id: Ulid,
        range: DateRange,
    ) -> Result<Vec<Booking>, EngineError> {
        let handle = self
            .get_vehicle_state(&vehicle_id)
            .ok_or(EngineError::NotFound(vehicle_id))?;
        let guard = handle.read().await;
        Ok(list_conflicts_in(&guard, &range).cloned().collect())
    }

    /// Listed and conflict-free for the range.
    pub async fn is_available(&self, vehicle_id: Ulid, range: DateRange) -> Result<bool, EngineError> {
        let handle = self
            .get_vehicle_state(&vehicle_id)
            .ok_or(EngineError::NotFound(vehicle_id))?;
        let guard = handle.read().await;
        Ok(guard.vehicle.is_available && !has_conflict_in(&guard, &range))
    }
}
