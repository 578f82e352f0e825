use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, used for record timestamps.
pub type Ms = i64;

/// Opaque user id handed to us by the identity provider.
pub type UserId = String;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or_default()
}

/// Closed calendar range `[start, end]`. Both days are occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Returns `None` when `end` falls before `start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Number of rental days, counting both ends.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Inclusive overlap: a shared boundary day counts.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub currency: String,
}

impl Money {
    pub fn new(amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FuelType {
    Petrol,
    Diesel,
    Electric,
    Hybrid,
}

impl FuelType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "petrol" | "gasoline" => Some(Self::Petrol),
            "diesel" => Some(Self::Diesel),
            "electric" => Some(Self::Electric),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transmission {
    Manual,
    Automatic,
}

impl Transmission {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Some(Self::Manual),
            "automatic" | "auto" => Some(Self::Automatic),
            _ => None,
        }
    }
}

/// A listed rental vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: Ulid,
    pub owner_id: UserId,
    pub make: String,
    pub model: String,
    pub year: u16,
    pub description: Option<String>,
    pub price_per_day: Money,
    pub location: String,
    pub city: String,
    pub seats: u32,
    pub fuel_type: FuelType,
    pub transmission: Transmission,
    /// Owner-controlled listing flag. Independent of date availability.
    pub is_available: bool,
    pub images: Vec<String>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

/// Owner input for a new listing; the engine assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVehicle {
    pub owner_id: UserId,
    pub make: String,
    pub model: String,
    pub year: u16,
    pub description: Option<String>,
    pub price_per_day: Money,
    pub location: String,
    pub city: String,
    pub seats: u32,
    pub fuel_type: FuelType,
    pub transmission: Transmission,
    pub is_available: bool,
    pub images: Vec<String>,
}

/// Owner edit. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VehiclePatch {
    pub description: Option<String>,
    pub price_per_day: Option<Money>,
    pub location: Option<String>,
    pub city: Option<String>,
    pub seats: Option<u32>,
    pub fuel_type: Option<FuelType>,
    pub transmission: Option<Transmission>,
    pub is_available: Option<bool>,
    pub images: Option<Vec<String>>,
}

impl VehiclePatch {
    pub fn apply(self, v: &mut Vehicle) {
        if let Some(d) = self.description {
            v.description = Some(d);
        }
        if let Some(p) = self.price_per_day {
            v.price_per_day = p;
        }
        if let Some(l) = self.location {
            v.location = l;
        }
        if let Some(c) = self.city {
            v.city = c;
        }
        if let Some(s) = self.seats {
            v.seats = s;
        }
        if let Some(f) = self.fuel_type {
            v.fuel_type = f;
        }
        if let Some(t) = self.transmission {
            v.transmission = t;
        }
        if let Some(a) = self.is_available {
            v.is_available = a;
        }
        if let Some(i) = self.images {
            v.images = i;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Active,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether the booking still holds its dates.
    pub fn blocks_dates(self) -> bool {
        self != Self::Cancelled
    }

    /// The fixed lifecycle graph.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Active)
                | (Confirmed, Cancelled)
                | (Active, Completed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!((self, next), (Pending, Paid) | (Paid, Refunded))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reservation record. `car_id`, `renter_id` and `dates` never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Ulid,
    pub car_id: Ulid,
    pub renter_id: UserId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: BookingStatus,
    pub total_amount: Money,
    pub payment_status: PaymentStatus,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl Booking {
    pub fn dates(&self) -> DateRange {
        DateRange {
            start: self.start_date,
            end: self.end_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub car_id: Ulid,
    pub renter_id: UserId,
    pub dates: DateRange,
    /// Computed from the daily price when absent.
    pub total_amount: Option<Decimal>,
}

/// In-memory state for one vehicle: the catalog record plus its ledger slice.
#[derive(Debug, Clone)]
pub struct VehicleState {
    pub vehicle: Vehicle,
    /// Every booking ever made for this vehicle, sorted by `start_date`.
    pub bookings: Vec<Booking>,
    /// Set when the owner deletes the listing. History stays readable.
    pub retired: bool,
}

impl VehicleState {
    pub fn new(vehicle: Vehicle) -> Self {
        Self {
            vehicle,
            bookings: Vec::new(),
            retired: false,
        }
    }

    /// Insert keeping start-date order.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .partition_point(|b| b.start_date <= booking.start_date);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Bookings whose range could touch `range`. Binary search skips everything
    /// starting after `range.end`.
    pub fn candidates(&self, range: &DateRange) -> impl Iterator<Item = &Booking> {
        let right_bound = self.bookings.partition_point(|b| b.start_date <= range.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.end_date >= range.start)
    }

    pub fn has_open_bookings(&self) -> bool {
        self.bookings.iter().any(|b| !b.status.is_terminal())
    }
}

/// Ledger record format. Every catalog or booking mutation is one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    VehicleCreated {
        vehicle: Vehicle,
    },
    VehicleUpdated {
        vehicle: Vehicle,
    },
    VehicleRetired {
        id: Ulid,
    },
    BookingCreated {
        booking: Booking,
    },
    BookingStatusChanged {
        id: Ulid,
        car_id: Ulid,
        status: BookingStatus,
        at: Ms,
    },
    PaymentStatusChanged {
        id: Ulid,
        car_id: Ulid,
        payment_status: PaymentStatus,
        at: Ms,
    },
}

impl Event {
    pub fn vehicle_id(&self) -> Ulid {
        match self {
            Event::VehicleCreated { vehicle } | Event::VehicleUpdated { vehicle } => vehicle.id,
            Event::VehicleRetired { id } => *id,
            Event::BookingCreated { booking } => booking.car_id,
            Event::BookingStatusChanged { car_id, .. }
            | Event::PaymentStatusChanged { car_id, .. } => *car_id,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Event::VehicleCreated { .. } => "vehicle_created",
            Event::VehicleUpdated { .. } => "vehicle_updated",
            Event::VehicleRetired { .. } => "vehicle_retired",
            Event::BookingCreated { .. } => "booking_created",
            Event::BookingStatusChanged { .. } => "booking_status_changed",
            Event::PaymentStatusChanged { .. } => "payment_status_changed",
        }
    }
}
