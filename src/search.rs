use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::engine::has_conflict_in;
use crate::limits::DEFAULT_PAGE_LIMIT;
use crate::model::*;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    /// Listing creation time.
    #[default]
    Date,
    Price,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// A validated search request. Built at the HTTP boundary; the engine trusts it.
///
/// Field order is the cache key's field order, so don't reorder casually.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilter {
    pub city: Option<String>,
    pub location: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    /// Minimum seat count.
    pub seats: Option<u32>,
    /// Empty means any fuel.
    pub fuel_types: BTreeSet<FuelType>,
    pub transmission: Option<Transmission>,
    pub dates: Option<DateRange>,
    pub owner_id: Option<UserId>,
    /// 1-based.
    pub page: usize,
    pub limit: usize,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

impl Default for SearchFilter {
    fn default() -> Self {
        Self {
            city: None,
            location: None,
            min_price: None,
            max_price: None,
            seats: None,
            fuel_types: BTreeSet::new(),
            transmission: None,
            dates: None,
            owner_id: None,
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
            sort_by: SortBy::default(),
            sort_order: SortOrder::default(),
        }
    }
}

fn normalize_text(s: &Option<String>) -> Option<String> {
    s.as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
}

impl SearchFilter {
    /// Canonical serialization: trimmed lowercase text, sorted fuel set,
    /// pagination included.
    pub fn cache_key(&self) -> String {
        let canonical = SearchFilter {
            city: normalize_text(&self.city),
            location: normalize_text(&self.location),
            owner_id: self.owner_id.clone(),
            fuel_types: self.fuel_types.clone(),
            ..self.clone()
        };
        // Plain struct of strings, numbers and enums; serializing can't fail.
        serde_json::to_string(&canonical).unwrap_or_default()
    }

    /// Catalog-only predicate: everything except date availability. The
    /// listing flag is tested first since it rejects the most.
    pub fn matches_vehicle(&self, v: &Vehicle) -> bool {
        if !v.is_available {
            return false;
        }
        if let Some(owner) = &self.owner_id
            && &v.owner_id != owner
        {
            return false;
        }
        if let Some(city) = normalize_text(&self.city)
            && !v.city.to_lowercase().contains(&city)
        {
            return false;
        }
        if let Some(loc) = normalize_text(&self.location)
            && !v.location.to_lowercase().contains(&loc)
        {
            return false;
        }
        let price = v.price_per_day.amount;
        if self.min_price.is_some_and(|min| price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| price > max) {
            return false;
        }
        if self.seats.is_some_and(|s| v.seats < s) {
            return false;
        }
        if !self.fuel_types.is_empty() && !self.fuel_types.contains(&v.fuel_type) {
            return false;
        }
        if self.transmission.is_some_and(|t| v.transmission != t) {
            return false;
        }
        true
    }

    /// Full predicate over a vehicle and its bookings.
    pub fn matches(&self, state: &VehicleState) -> bool {
        if !self.matches_vehicle(&state.vehicle) {
            return false;
        }
        match &self.dates {
            Some(range) => !has_conflict_in(state, range),
            None => true,
        }
    }

    fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

/// One page of results plus the size of the whole filtered set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchPage {
    pub items: Vec<Vehicle>,
    pub total: usize,
}

impl SearchPage {
    pub fn total_pages(&self, limit: usize) -> usize {
        total_pages(self.total, limit)
    }
}

pub fn total_pages(total: usize, limit: usize) -> usize {
    if limit == 0 {
        return 0;
    }
    total.div_ceil(limit)
}

/// Stable sort, then slice. `total` is the filtered length, never the
/// catalog size.
pub fn sort_and_paginate(mut matched: Vec<Vehicle>, filter: &SearchFilter) -> SearchPage {
    matched.sort_by(|a, b| {
        let ord = match filter.sort_by {
            SortBy::Date => a.created_at.cmp(&b.created_at),
            SortBy::Price => a.price_per_day.amount.cmp(&b.price_per_day.amount),
        };
        // Flip the comparator, not the output, so ties keep input order.
        match filter.sort_order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });

    let total = matched.len();
    let items = matched
        .into_iter()
        .skip(filter.offset())
        .take(filter.limit)
        .collect();
    SearchPage { items, total }
}
