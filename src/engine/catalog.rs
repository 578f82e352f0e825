use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

fn check_text(value: &str, what: &'static str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::Validation(format!("{what} must not be empty")));
    }
    if value.len() > MAX_TEXT_LEN {
        return Err(EngineError::LimitExceeded(what));
    }
    Ok(())
}

fn check_price(price: &Money) -> Result<(), EngineError> {
    if price.amount <= Decimal::ZERO {
        return Err(EngineError::Validation("pricePerDay must be positive".into()));
    }
    if price.amount > Decimal::from(MAX_PRICE_PER_DAY) {
        return Err(EngineError::LimitExceeded("pricePerDay above maximum"));
    }
    if price.currency.len() != 3 || !price.currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(EngineError::Validation(format!(
            "currency must be a 3-letter ISO code, got {:?}",
            price.currency
        )));
    }
    Ok(())
}

fn check_seats(seats: u32) -> Result<(), EngineError> {
    if seats == 0 {
        return Err(EngineError::Validation("seats must be at least 1".into()));
    }
    if seats > MAX_SEATS {
        return Err(EngineError::LimitExceeded("too many seats"));
    }
    Ok(())
}

fn check_extras(description: Option<&str>, images: Option<&[String]>) -> Result<(), EngineError> {
    if description.is_some_and(|d| d.len() > MAX_DESCRIPTION_LEN) {
        return Err(EngineError::LimitExceeded("description too long"));
    }
    if let Some(images) = images {
        if images.len() > MAX_IMAGES {
            return Err(EngineError::LimitExceeded("too many images"));
        }
        if images.iter().any(|i| i.len() > MAX_TEXT_LEN) {
            return Err(EngineError::LimitExceeded("image reference too long"));
        }
    }
    Ok(())
}

impl Engine {
    pub async fn create_vehicle(&self, new: NewVehicle) -> Result<Vehicle, EngineError> {
        if self.catalog.len() >= MAX_VEHICLES {
            return Err(EngineError::LimitExceeded("too many vehicles"));
        }
        check_text(&new.owner_id, "ownerId")?;
        check_text(&new.make, "make")?;
        check_text(&new.model, "model")?;
        check_text(&new.location, "location")?;
        check_text(&new.city, "city")?;
        check_price(&new.price_per_day)?;
        check_seats(new.seats)?;
        check_extras(new.description.as_deref(), Some(&new.images))?;

        let now = now_ms();
        let vehicle = Vehicle {
            id: Ulid::new(),
            owner_id: new.owner_id,
            make: new.make,
            model: new.model,
            year: new.year,
            description: new.description,
            price_per_day: new.price_per_day,
            location: new.location,
            city: new.city,
            seats: new.seats,
            fuel_type: new.fuel_type,
            transmission: new.transmission,
            is_available: new.is_available,
            images: new.images,
            created_at: now,
            updated_at: now,
        };

        let _gate = self.ledger_gate.read().await;
        let event = Event::VehicleCreated {
            vehicle: vehicle.clone(),
        };
        self.persist(&event).await?;
        self.catalog.insert(
            vehicle.id,
            Arc::new(RwLock::new(VehicleState::new(vehicle.clone()))),
        );
        self.after_commit(&event);
        metrics::gauge!(crate::observability::VEHICLES_ACTIVE).set(self.catalog.len() as f64);
        tracing::info!(vehicle_id = %vehicle.id, owner = %vehicle.owner_id, "vehicle listed");
        Ok(vehicle)
    }

    pub async fn update_vehicle(&self, id: Ulid, patch: VehiclePatch) -> Result<Vehicle, EngineError> {
        if let Some(l) = &patch.location {
            check_text(l, "location")?;
        }
        if let Some(c) = &patch.city {
            check_text(c, "city")?;
        }
        if let Some(p) = &patch.price_per_day {
            check_price(p)?;
        }
        if let Some(s) = patch.seats {
            check_seats(s)?;
        }
        check_extras(patch.description.as_deref(), patch.images.as_deref())?;

        let _gate = self.ledger_gate.read().await;
        let handle = self.get_vehicle_state(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = handle.write().await;
        if guard.retired {
            return Err(EngineError::NotFound(id));
        }

        let mut updated = guard.vehicle.clone();
        patch.apply(&mut updated);
        updated.updated_at = now_ms();

        let event = Event::VehicleUpdated {
            vehicle: updated.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(updated)
    }

    /// Owner flips the listing flag without touching anything else.
    pub async fn set_listed(&self, id: Ulid, listed: bool) -> Result<Vehicle, EngineError> {
        let patch = VehiclePatch {
            is_available: Some(listed),
            ..Default::default()
        };
        self.update_vehicle(id, patch).await
    }

    /// Rejected while any booking is pending, confirmed or active. Otherwise
    /// the vehicle leaves the catalog and its history moves to the archive.
    pub async fn delete_vehicle(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.ledger_gate.read().await;
        let handle = self.get_vehicle_state(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = handle.write().await;
        if guard.retired {
            return Err(EngineError::NotFound(id));
        }
        if guard.has_open_bookings() {
            return Err(EngineError::VehicleHasActiveBookings(id));
        }

        let event = Event::VehicleRetired { id };
        self.persist_and_apply(&mut guard, &event).await?;
        self.move_to_archive(id);
        tracing::info!(vehicle_id = %id, "vehicle retired");
        Ok(())
    }
}
