//! HTTP surface over the engine.

mod bookings;
pub mod dto;
mod error;
mod vehicles;

pub use error::ApiError;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{MatchedPath, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use ulid::Ulid;

use crate::engine::Engine;
use dto::{OwnerSummary, RatingSummary};

/// Owner profiles and review aggregates live in another service. The
/// vehicle detail view asks it; a `None` just leaves the field empty.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn owner_summary(&self, owner_id: &str) -> Option<OwnerSummary>;
    async fn vehicle_rating(&self, vehicle_id: Ulid) -> Option<RatingSummary>;
}

/// Used when no profile service is wired in.
pub struct NoProfiles;

#[async_trait]
impl ProfileDirectory for NoProfiles {
    async fn owner_summary(&self, _owner_id: &str) -> Option<OwnerSummary> {
        None
    }

    async fn vehicle_rating(&self, _vehicle_id: Ulid) -> Option<RatingSummary> {
        None
    }
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    /// Flipped once the ledger is loaded and the listener is bound.
    pub readiness: Arc<AtomicBool>,
    pub profiles: Arc<dyn ProfileDirectory>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            readiness: Arc::new(AtomicBool::new(false)),
            profiles: Arc::new(NoProfiles),
        }
    }

    pub fn with_profiles(mut self, profiles: Arc<dyn ProfileDirectory>) -> Self {
        self.profiles = profiles;
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/cars", get(vehicles::search).post(vehicles::create))
        .route(
            "/cars/:id",
            get(vehicles::detail)
                .put(vehicles::update)
                .delete(vehicles::delete),
        )
        .route("/cars/:id/bookings", get(vehicles::bookings))
        .route("/cars/:id/availability", get(vehicles::availability))
        .route("/owners/:id/cars", get(vehicles::owner_listings))
        .route("/bookings", axum::routing::post(bookings::create))
        .route(
            "/bookings/:id",
            get(bookings::get).put(bookings::update).delete(bookings::cancel),
        )
        .route("/renters/:id/bookings", get(bookings::for_renter))
        .route_layer(axum::middleware::from_fn(track_requests))
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .with_state(state)
}

async fn track_requests(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_default();
    let method = req.method().to_string();
    let response = next.run(req).await;
    metrics::counter!(
        crate::observability::HTTP_REQUESTS_TOTAL,
        "method" => method,
        "route" => route,
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);
    response
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Acquire);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}
