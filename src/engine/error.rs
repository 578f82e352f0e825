use ulid::Ulid;

use crate::model::{BookingStatus, DateRange, PaymentStatus};

#[derive(Debug)]
pub enum EngineError {
    Validation(String),
    NotFound(Ulid),
    /// Requested dates overlap these live bookings.
    DatesUnavailable {
        car_id: Ulid,
        range: DateRange,
        conflicting: Vec<Ulid>,
    },
    /// Vehicle exists but its listing flag is off.
    VehicleUnlisted(Ulid),
    IllegalTransition {
        id: Ulid,
        from: BookingStatus,
        to: BookingStatus,
    },
    IllegalPaymentTransition {
        id: Ulid,
        from: PaymentStatus,
        to: PaymentStatus,
    },
    VehicleHasActiveBookings(Ulid),
    LimitExceeded(&'static str),
    Storage(String),
}

impl EngineError {
    /// Stable machine-readable code surfaced to clients.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation_error",
            EngineError::NotFound(_) => "not_found",
            EngineError::DatesUnavailable { .. } => "dates_unavailable",
            EngineError::VehicleUnlisted(_) => "vehicle_unavailable",
            EngineError::IllegalTransition { .. } | EngineError::IllegalPaymentTransition { .. } => {
                "illegal_transition"
            }
            EngineError::VehicleHasActiveBookings(_) => "vehicle_has_active_bookings",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::Storage(_) => "storage_error",
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            EngineError::DatesUnavailable { .. }
                | EngineError::VehicleUnlisted(_)
                | EngineError::IllegalTransition { .. }
                | EngineError::IllegalPaymentTransition { .. }
                | EngineError::VehicleHasActiveBookings(_)
        )
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "invalid input: {msg}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::DatesUnavailable { car_id, range, conflicting } => write!(
                f,
                "dates unavailable: vehicle {car_id} is booked between {} and {} ({} conflicting)",
                range.start,
                range.end,
                conflicting.len()
            ),
            EngineError::VehicleUnlisted(id) => write!(f, "vehicle {id} is not listed for rent"),
            EngineError::IllegalTransition { id, from, to } => {
                write!(f, "booking {id} cannot move from {from} to {to}")
            }
            EngineError::IllegalPaymentTransition { id, from, to } => {
                write!(f, "booking {id} payment cannot move from {from} to {to}")
            }
            EngineError::VehicleHasActiveBookings(id) => {
                write!(f, "cannot delete vehicle {id}: it has open bookings")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Storage(e.to_string())
    }
}
