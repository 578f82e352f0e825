use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde_json::json;

use crate::model::{Booking, Vehicle};

use super::dto::*;
use super::{ApiError, AppState};

pub(super) async fn search(
    State(state): State<AppState>,
    query: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Query(params) = query?;
    let filter = params.into_filter()?;
    let page = state.engine.search(&filter).await;
    Ok(Json(SearchResponse::new(&page, &filter)))
}

pub(super) async fn create(
    State(state): State<AppState>,
    body: Result<Json<CreateVehicleBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Vehicle>), ApiError> {
    let Json(body) = body?;
    let vehicle = state.engine.create_vehicle(body.into_new_vehicle()?).await?;
    Ok((StatusCode::CREATED, Json(vehicle)))
}

pub(super) async fn detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<VehicleDetail>, ApiError> {
    let id = parse_id(&id, "vehicle id")?;
    let vehicle = state.engine.get_vehicle(id).await?;
    let (owner, rating) = tokio::join!(
        state.profiles.owner_summary(&vehicle.owner_id),
        state.profiles.vehicle_rating(id),
    );
    Ok(Json(VehicleDetail {
        vehicle,
        owner,
        rating,
    }))
}

pub(super) async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<UpdateVehicleBody>, JsonRejection>,
) -> Result<Json<Vehicle>, ApiError> {
    let id = parse_id(&id, "vehicle id")?;
    let Json(body) = body?;
    let current = state.engine.get_vehicle(id).await?;
    let patch = body.into_patch(&current.price_per_day.currency)?;
    let vehicle = state.engine.update_vehicle(id, patch).await?;
    Ok(Json(vehicle))
}

pub(super) async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, "vehicle id")?;
    state.engine.delete_vehicle(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn bookings(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Booking>>, ApiError> {
    let id = parse_id(&id, "vehicle id")?;
    Ok(Json(state.engine.list_vehicle_bookings(id).await?))
}

pub(super) async fn availability(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<RangeParams>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_id(&id, "vehicle id")?;
    let Query(params) = query?;
    let range = params.into_range()?;
    let available = state.engine.is_available(id, range).await?;
    Ok(Json(json!({
        "carId": id,
        "startDate": range.start,
        "endDate": range.end,
        "available": available,
    })))
}

/// Every listing of one owner, unlisted ones included.
pub(super) async fn owner_listings(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> Json<Vec<Vehicle>> {
    Json(state.engine.list_owner_vehicles(&owner_id).await)
}
