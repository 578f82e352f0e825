use rust_decimal::Decimal;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, validate_range};
use super::{Engine, EngineError};

impl Engine {
    /// Reserve a vehicle. The conflict check and the ledger write happen under
    /// the vehicle's write lock, so two overlapping requests can't both pass.
    pub async fn create_booking(&self, req: BookingRequest) -> Result<Booking, EngineError> {
        validate_range(&req.dates)?;
        if req.renter_id.trim().is_empty() {
            return Err(EngineError::Validation("renterId must not be empty".into()));
        }
        if req.total_amount.is_some_and(|a| a < Decimal::ZERO) {
            return Err(EngineError::Validation("totalAmount must not be negative".into()));
        }

        let _gate = self.ledger_gate.read().await;
        let handle = self
            .get_vehicle_state(&req.car_id)
            .ok_or(EngineError::NotFound(req.car_id))?;
        let mut guard = handle.write().await;
        if guard.retired {
            return Err(EngineError::NotFound(req.car_id));
        }
        if !guard.vehicle.is_available {
            return Err(EngineError::VehicleUnlisted(req.car_id));
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_VEHICLE {
            return Err(EngineError::LimitExceeded("too many bookings on vehicle"));
        }
        if let Err(e) = check_no_conflict(&guard, &req.dates) {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            tracing::debug!(car_id = %req.car_id, start = %req.dates.start, end = %req.dates.end, "booking rejected: dates unavailable");
            return Err(e);
        }

        let price = &guard.vehicle.price_per_day;
        let amount = match req.total_amount {
            Some(amount) => amount,
            None => price
                .amount
                .checked_mul(Decimal::from(req.dates.days()))
                .ok_or(EngineError::LimitExceeded("booking amount overflows"))?,
        };
        let now = now_ms();
        let booking = Booking {
            id: Ulid::new(),
            car_id: req.car_id,
            renter_id: req.renter_id,
            start_date: req.dates.start,
            end_date: req.dates.end,
            status: BookingStatus::Pending,
            total_amount: Money::new(amount, price.currency.clone()),
            payment_status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        let event = Event::BookingCreated {
            booking: booking.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;

        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        tracing::info!(
            booking_id = %booking.id,
            car_id = %booking.car_id,
            renter = %booking.renter_id,
            start = %booking.start_date,
            end = %booking.end_date,
            "booking created"
        );
        Ok(booking)
    }

    /// Move a booking along the lifecycle graph. Moving to `cancelled` has
    /// the same idempotent semantics as [`Engine::cancel_booking`].
    pub async fn transition(&self, id: Ulid, next: BookingStatus) -> Result<Booking, EngineError> {
        self.update_booking(id, Some(next), None).await
    }

    /// Cancel a pending or confirmed booking. Cancelling twice succeeds twice;
    /// an active booking has to complete.
    pub async fn cancel_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        self.transition(id, BookingStatus::Cancelled).await
    }

    /// Payment is tracked independently: `pending → paid → refunded`.
    /// Setting the current value again is a no-op.
    pub async fn set_payment_status(
        &self,
        id: Ulid,
        next: PaymentStatus,
    ) -> Result<Booking, EngineError> {
        self.update_booking(id, None, Some(next)).await
    }

    /// Apply a status move and a payment move together. Both are checked
    /// against the current record before either is written.
    pub async fn update_booking(
        &self,
        id: Ulid,
        status: Option<BookingStatus>,
        payment: Option<PaymentStatus>,
    ) -> Result<Booking, EngineError> {
        let _gate = self.ledger_gate.read().await;
        let mut guard = self.resolve_booking_write(&id).await?;
        let current = guard.booking(id).cloned().ok_or(EngineError::NotFound(id))?;
        let at = now_ms();

        let status_event = match status {
            Some(next) => status_move(&current, next, at)?,
            None => None,
        };
        let payment_event = match payment {
            Some(next) => payment_move(&current, next, at)?,
            None => None,
        };

        if let (Some(event), Some(to)) = (status_event, status) {
            self.persist_and_apply(&mut guard, &event).await?;
            metrics::counter!(crate::observability::TRANSITIONS_TOTAL, "to" => to.as_str()).increment(1);
            tracing::info!(booking_id = %id, from = %current.status, to = %to, "booking transitioned");
        }
        if let (Some(event), Some(to)) = (payment_event, payment) {
            self.persist_and_apply(&mut guard, &event).await?;
            tracing::info!(booking_id = %id, from = %current.payment_status, to = %to, "payment status changed");
        }
        guard.booking(id).cloned().ok_or(EngineError::NotFound(id))
    }
}

/// The event for a legal status move, `None` for a repeated cancel.
fn status_move(
    booking: &Booking,
    next: BookingStatus,
    at: Ms,
) -> Result<Option<Event>, EngineError> {
    let from = booking.status;
    if from == BookingStatus::Cancelled && next == BookingStatus::Cancelled {
        return Ok(None);
    }
    if !from.can_transition_to(next) {
        return Err(EngineError::IllegalTransition {
            id: booking.id,
            from,
            to: next,
        });
    }
    Ok(Some(Event::BookingStatusChanged {
        id: booking.id,
        car_id: booking.car_id,
        status: next,
        at,
    }))
}

/// The event for a legal payment move, `None` when nothing changes.
fn payment_move(
    booking: &Booking,
    next: PaymentStatus,
    at: Ms,
) -> Result<Option<Event>, EngineError> {
    let from = booking.payment_status;
    if from == next {
        return Ok(None);
    }
    if !from.can_transition_to(next) {
        return Err(EngineError::IllegalPaymentTransition {
            id: booking.id,
            from,
            to: next,
        });
    }
    Ok(Some(Event::PaymentStatusChanged {
        id: booking.id,
        car_id: booking.car_id,
        payment_status: next,
        at,
    }))
}
