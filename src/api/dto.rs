//! Wire shapes for the HTTP surface and their validation into engine types.
//!
//! Everything arriving from a client is parsed here. The engine only ever
//! sees typed, range-checked values.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use crate::model::*;
use crate::search::{SearchFilter, SearchPage, SortBy, SortOrder};

use super::ApiError;

pub const DEFAULT_CURRENCY: &str = "EUR";

pub fn parse_id(raw: &str, what: &str) -> Result<Ulid, ApiError> {
    Ulid::from_string(raw.trim()).map_err(|_| ApiError::validation(format!("{what} is not a valid id")))
}

/// `YYYY-MM-DD`, or an RFC 3339 timestamp whose calendar date is used.
pub fn parse_date(raw: &str, what: &str) -> Result<NaiveDate, ApiError> {
    let raw = raw.trim();
    if let Ok(d) = raw.parse::<NaiveDate>() {
        return Ok(d);
    }
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .map_err(|_| ApiError::validation(format!("{what} must be a date (YYYY-MM-DD)")))
}

fn parse_range(start: &str, end: &str) -> Result<DateRange, ApiError> {
    let start = parse_date(start, "startDate")?;
    let end = parse_date(end, "endDate")?;
    DateRange::new(start, end)
        .ok_or_else(|| ApiError::validation("endDate must not be before startDate"))
}

fn parse_fuel(raw: &str) -> Result<FuelType, ApiError> {
    FuelType::parse(raw).ok_or_else(|| ApiError::validation(format!("unknown fuelType {raw:?}")))
}

fn parse_transmission(raw: &str) -> Result<Transmission, ApiError> {
    Transmission::parse(raw)
        .ok_or_else(|| ApiError::validation(format!("unknown transmission {raw:?}")))
}

fn parse_decimal(raw: &str, what: &str) -> Result<Decimal, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::validation(format!("{what} must be a number")))
}

fn parse_count(raw: &str, what: &str) -> Result<usize, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::validation(format!("{what} must be a positive integer")))
}

/// Drop empty query values so `?city=` behaves like no city at all.
fn present(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

// ── Search ──────────────────────────────────────────────────────

/// Raw `GET /cars` query. Every field arrives as text.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub city: Option<String>,
    pub location: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub seats: Option<String>,
    /// Comma-separated.
    pub fuel_type: Option<String>,
    pub transmission: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub owner_id: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl SearchParams {
    pub fn into_filter(self) -> Result<SearchFilter, ApiError> {
        let min_price = present(&self.min_price)
            .map(|s| parse_decimal(s, "minPrice"))
            .transpose()?;
        let max_price = present(&self.max_price)
            .map(|s| parse_decimal(s, "maxPrice"))
            .transpose()?;
        if let (Some(min), Some(max)) = (min_price, max_price)
            && min > max
        {
            return Err(ApiError::validation("minPrice must not exceed maxPrice"));
        }

        let seats = present(&self.seats)
            .map(|s| {
                s.parse::<u32>()
                    .map_err(|_| ApiError::validation("seats must be a positive integer"))
            })
            .transpose()?;

        let mut fuel_types = BTreeSet::new();
        if let Some(list) = present(&self.fuel_type) {
            for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                fuel_types.insert(parse_fuel(part)?);
            }
        }

        let transmission = present(&self.transmission)
            .map(parse_transmission)
            .transpose()?;

        let dates = match (present(&self.start_date), present(&self.end_date)) {
            (Some(s), Some(e)) => Some(parse_range(s, e)?),
            (None, None) => None,
            _ => {
                return Err(ApiError::validation(
                    "startDate and endDate must be supplied together",
                ));
            }
        };

        let page = present(&self.page)
            .map(|s| parse_count(s, "page"))
            .transpose()?
            .unwrap_or(1);
        if page == 0 {
            return Err(ApiError::validation("page must be at least 1"));
        }
        let limit = present(&self.limit)
            .map(|s| parse_count(s, "limit"))
            .transpose()?
            .unwrap_or(DEFAULT_PAGE_LIMIT);
        if limit == 0 {
            return Err(ApiError::validation("limit must be at least 1"));
        }
        if limit > MAX_PAGE_LIMIT {
            return Err(crate::engine::EngineError::LimitExceeded("limit above maximum").into());
        }

        let sort_by = match present(&self.sort_by).map(str::to_ascii_lowercase).as_deref() {
            None | Some("date") | Some("createdat") => SortBy::Date,
            Some("price") | Some("priceperday") => SortBy::Price,
            Some(other) => return Err(ApiError::validation(format!("unknown sortBy {other:?}"))),
        };
        let sort_order = match present(&self.sort_order).map(str::to_ascii_lowercase).as_deref() {
            None | Some("desc") => SortOrder::Desc,
            Some("asc") => SortOrder::Asc,
            Some(other) => {
                return Err(ApiError::validation(format!("unknown sortOrder {other:?}")));
            }
        };

        Ok(SearchFilter {
            city: present(&self.city).map(String::from),
            location: present(&self.location).map(String::from),
            min_price,
            max_price,
            seats,
            fuel_types,
            transmission,
            dates,
            owner_id: present(&self.owner_id).map(String::from),
            page,
            limit,
            sort_by,
            sort_order,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub cars: Vec<Vehicle>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

impl SearchResponse {
    pub fn new(page: &SearchPage, filter: &SearchFilter) -> Self {
        Self {
            cars: page.items.clone(),
            total: page.total,
            page: filter.page,
            limit: filter.limit,
            total_pages: page.total_pages(filter.limit),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl RangeParams {
    pub fn into_range(self) -> Result<DateRange, ApiError> {
        match (present(&self.start_date), present(&self.end_date)) {
            (Some(s), Some(e)) => parse_range(s, e),
            _ => Err(ApiError::validation("startDate and endDate are required")),
        }
    }
}

// ── Vehicles ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVehicleBody {
    pub owner_id: String,
    pub make: String,
    pub model: String,
    pub year: u16,
    #[serde(default)]
    pub description: Option<String>,
    pub price_per_day: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    pub location: String,
    pub city: String,
    pub seats: u32,
    pub fuel_type: String,
    pub transmission: String,
    #[serde(default = "listed_by_default")]
    pub is_available: bool,
    #[serde(default)]
    pub images: Vec<String>,
}

fn listed_by_default() -> bool {
    true
}

impl CreateVehicleBody {
    pub fn into_new_vehicle(self) -> Result<NewVehicle, ApiError> {
        let currency = self
            .currency
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        Ok(NewVehicle {
            owner_id: self.owner_id,
            make: self.make,
            model: self.model,
            year: self.year,
            description: self.description,
            price_per_day: Money::new(self.price_per_day, currency.trim().to_ascii_uppercase()),
            location: self.location,
            city: self.city,
            seats: self.seats,
            fuel_type: parse_fuel(&self.fuel_type)?,
            transmission: parse_transmission(&self.transmission)?,
            is_available: self.is_available,
            images: self.images,
        })
    }
}

/// Owner edit. A price without a currency keeps the listing's currency.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVehicleBody {
    pub description: Option<String>,
    pub price_per_day: Option<Decimal>,
    pub currency: Option<String>,
    pub location: Option<String>,
    pub city: Option<String>,
    pub seats: Option<u32>,
    pub fuel_type: Option<String>,
    pub transmission: Option<String>,
    pub is_available: Option<bool>,
    pub images: Option<Vec<String>>,
}

impl UpdateVehicleBody {
    pub fn into_patch(self, current_currency: &str) -> Result<VehiclePatch, ApiError> {
        let price_per_day = match (self.price_per_day, self.currency) {
            (Some(amount), currency) => {
                let currency = currency.unwrap_or_else(|| current_currency.to_string());
                Some(Money::new(amount, currency.trim().to_ascii_uppercase()))
            }
            (None, Some(_)) => {
                return Err(ApiError::validation("currency can only change with pricePerDay"));
            }
            (None, None) => None,
        };
        Ok(VehiclePatch {
            description: self.description,
            price_per_day,
            location: self.location,
            city: self.city,
            seats: self.seats,
            fuel_type: self.fuel_type.as_deref().map(parse_fuel).transpose()?,
            transmission: self
                .transmission
                .as_deref()
                .map(parse_transmission)
                .transpose()?,
            is_available: self.is_available,
            images: self.images,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerSummary {
    pub id: UserId,
    pub name: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub average: f64,
    pub count: u32,
}

/// `GET /cars/:id`: the vehicle plus whatever the profile directory knows.
#[derive(Debug, Serialize)]
pub struct VehicleDetail {
    #[serde(flatten)]
    pub vehicle: Vehicle,
    pub owner: Option<OwnerSummary>,
    pub rating: Option<RatingSummary>,
}

// ── Bookings ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingBody {
    pub car_id: String,
    pub renter_id: String,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub total_amount: Option<Decimal>,
}

impl CreateBookingBody {
    pub fn into_request(self) -> Result<BookingRequest, ApiError> {
        Ok(BookingRequest {
            car_id: parse_id(&self.car_id, "carId")?,
            renter_id: self.renter_id.trim().to_string(),
            dates: parse_range(&self.start_date, &self.end_date)?,
            total_amount: self.total_amount,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookingBody {
    pub status: Option<String>,
    pub payment_status: Option<String>,
}

/// What `PUT /bookings/:id` asked for, already parsed.
#[derive(Debug, PartialEq, Eq)]
pub struct BookingUpdate {
    pub status: Option<BookingStatus>,
    pub payment_status: Option<PaymentStatus>,
}

impl UpdateBookingBody {
    pub fn into_update(self) -> Result<BookingUpdate, ApiError> {
        let status = present(&self.status)
            .map(|s| {
                BookingStatus::parse(s)
                    .ok_or_else(|| ApiError::validation(format!("unknown status {s:?}")))
            })
            .transpose()?;
        let payment_status = present(&self.payment_status)
            .map(|s| {
                PaymentStatus::parse(s)
                    .ok_or_else(|| ApiError::validation(format!("unknown paymentStatus {s:?}")))
            })
            .transpose()?;
        if status.is_none() && payment_status.is_none() {
            return Err(ApiError::validation("nothing to update: give status or paymentStatus"));
        }
        Ok(BookingUpdate {
            status,
            payment_status,
        })
    }
}
