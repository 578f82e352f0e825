use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use crate::model::Booking;

use super::dto::*;
use super::{ApiError, AppState};

pub(super) async fn create(
    State(state): State<AppState>,
    body: Result<Json<CreateBookingBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let Json(body) = body?;
    let booking = state.engine.create_booking(body.into_request()?).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

pub(super) async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, ApiError> {
    let id = parse_id(&id, "booking id")?;
    Ok(Json(state.engine.get_booking(id).await?))
}

/// Both moves are checked before either is applied; a rejected one changes nothing.
pub(super) async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<UpdateBookingBody>, JsonRejection>,
) -> Result<Json<Booking>, ApiError> {
    let id = parse_id(&id, "booking id")?;
    let Json(body) = body?;
    let update = body.into_update()?;
    let booking = state
        .engine
        .update_booking(id, update.status, update.payment_status)
        .await?;
    Ok(Json(booking))
}

/// Idempotent: cancelling a cancelled booking returns it unchanged.
pub(super) async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, ApiError> {
    let id = parse_id(&id, "booking id")?;
    Ok(Json(state.engine.cancel_booking(id).await?))
}

pub(super) async fn for_renter(
    State(state): State<AppState>,
    Path(renter_id): Path<String>,
) -> Json<Vec<Booking>> {
    Json(state.engine.list_renter_bookings(&renter_id).await)
}
