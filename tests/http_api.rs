use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;
use ulid::Ulid;

use fleetbook::api::dto::{OwnerSummary, RatingSummary};
use fleetbook::api::{self, AppState, ProfileDirectory};
use fleetbook::cache::ResultCache;
use fleetbook::engine::Engine;
use fleetbook::notify::NotifyHub;
use fleetbook::storage::MemoryStorage;

async fn test_state() -> AppState {
    let engine = Engine::open(
        Arc::new(MemoryStorage::new()),
        Arc::new(ResultCache::new(Duration::from_secs(120))),
        Arc::new(NotifyHub::new()),
    )
    .await
    .unwrap();
    let state = AppState::new(Arc::new(engine));
    state.readiness.store(true, Ordering::Release);
    state
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(b) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&b).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.expect("route executes");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json payload")
    };
    (status, value)
}

fn car(city: &str, price: &str) -> Value {
    json!({
        "ownerId": "owner-1",
        "make": "Fiat",
        "model": "Panda",
        "year": 2021,
        "pricePerDay": price,
        "currency": "EUR",
        "location": "Stazione Centrale",
        "city": city,
        "seats": 4,
        "fuelType": "petrol",
        "transmission": "manual",
    })
}

async fn create_car(app: &Router, city: &str, price: &str) -> String {
    let (status, body) = send(app, "POST", "/cars", Some(car(city, price))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

async fn book(app: &Router, car_id: &str, start: &str, end: &str) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        "/bookings",
        Some(json!({
            "carId": car_id,
            "renterId": "renter-1",
            "startDate": start,
            "endDate": end,
        })),
    )
    .await
}

#[tokio::test]
async fn health_and_ready() {
    let state = test_state().await;
    let readiness = state.readiness.clone();
    let app = api::router(state);

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = send(&app, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);

    readiness.store(false, Ordering::Release);
    let (status, body) = send(&app, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "initializing");
}

#[tokio::test]
async fn create_and_fetch_car() {
    let app = api::router(test_state().await);
    let id = create_car(&app, "Milano", "45.50").await;

    let (status, body) = send(&app, "GET", &format!("/cars/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["city"], "Milano");
    assert_eq!(body["pricePerDay"]["amount"], "45.50");
    assert_eq!(body["pricePerDay"]["currency"], "EUR");
    assert_eq!(body["isAvailable"], true);
    assert!(body["owner"].is_null());
    assert!(body["rating"].is_null());
}

#[tokio::test]
async fn unknown_and_malformed_ids() {
    let app = api::router(test_state().await);

    let (status, body) = send(&app, "GET", &format!("/cars/{}", Ulid::new()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (status, body) = send(&app, "GET", "/bookings/not-an-id", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn malformed_body_is_validation_error() {
    let app = api::router(test_state().await);
    let (status, body) = send(&app, "POST", "/bookings", Some(json!({ "carId": 7 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");

    let mut bad_fuel = car("Roma", "30");
    bad_fuel["fuelType"] = json!("steam");
    let (status, body) = send(&app, "POST", "/cars", Some(bad_fuel)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn booking_conflict_is_409_with_code() {
    let app = api::router(test_state().await);
    let id = create_car(&app, "Milano", "40").await;

    let (status, booking) = book(&app, &id, "2025-06-01", "2025-06-05").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["status"], "pending");
    assert_eq!(booking["paymentStatus"], "pending");
    assert_eq!(booking["totalAmount"]["amount"], "200");

    let (status, body) = book(&app, &id, "2025-06-05", "2025-06-07").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "dates_unavailable");
    assert!(body["error"].as_str().unwrap().contains("2025-06-05"));

    let (status, body) = book(&app, &id, "2025-06-09", "2025-06-08").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn search_excludes_booked_and_paginates() {
    let app = api::router(test_state().await);
    let mut ids = Vec::new();
    for i in 0..23 {
        ids.push(create_car(&app, "Torino", &format!("{}", 30 + i)).await);
    }
    let booked = create_car(&app, "Torino", "99").await;
    let (status, _) = book(&app, &booked, "2025-06-01", "2025-06-05").await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        "GET",
        "/cars?city=torino&startDate=2025-06-03&endDate=2025-06-04&limit=10",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 23);
    assert_eq!(body["totalPages"], 3);
    assert_eq!(body["page"], 1);
    assert_eq!(body["cars"].as_array().unwrap().len(), 10);

    let (_, body) = send(
        &app,
        "GET",
        "/cars?city=torino&startDate=2025-06-03&endDate=2025-06-04&limit=10&page=3",
        None,
    )
    .await;
    let cars = body["cars"].as_array().unwrap();
    assert_eq!(cars.len(), 3);
    assert!(cars.iter().all(|c| c["id"] != booked.as_str()));

    let (_, body) = send(&app, "GET", "/cars?sortBy=price&sortOrder=asc&limit=1", None).await;
    assert_eq!(body["cars"][0]["pricePerDay"]["amount"], "30");
    assert_eq!(body["total"], 24);
}

#[tokio::test]
async fn search_rejects_bad_query() {
    let app = api::router(test_state().await);
    let (status, body) = send(&app, "GET", "/cars?startDate=2025-06-01", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");

    let (status, body) = send(&app, "GET", "/cars?limit=500", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "limit_exceeded");
}

#[tokio::test]
async fn availability_endpoint() {
    let app = api::router(test_state().await);
    let id = create_car(&app, "Napoli", "25").await;
    book(&app, &id, "2025-06-01", "2025-06-05").await;

    let (status, body) = send(
        &app,
        "GET",
        &format!("/cars/{id}/availability?startDate=2025-06-05&endDate=2025-06-06"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], false);

    let (_, body) = send(
        &app,
        "GET",
        &format!("/cars/{id}/availability?startDate=2025-06-06&endDate=2025-06-10"),
        None,
    )
    .await;
    assert_eq!(body["available"], true);
}

#[tokio::test]
async fn booking_lifecycle_over_http() {
    let app = api::router(test_state().await);
    let car_id = create_car(&app, "Bologna", "50").await;
    let (_, booking) = book(&app, &car_id, "2025-07-01", "2025-07-03").await;
    let uri = format!("/bookings/{}", booking["id"].as_str().unwrap());

    let (status, body) = send(&app, "PUT", &uri, Some(json!({ "status": "active" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "illegal_transition");

    let (status, body) = send(
        &app,
        "PUT",
        &uri,
        Some(json!({ "status": "confirmed", "paymentStatus": "paid" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "confirmed");
    assert_eq!(body["paymentStatus"], "paid");

    let (status, first) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["status"], "cancelled");
    let (status, second) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, second);

    let (_, list) = send(&app, "GET", "/renters/renter-1/bookings", None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    let (_, list) = send(&app, "GET", &format!("/cars/{car_id}/bookings"), None).await;
    assert_eq!(list[0]["status"], "cancelled");
}

#[tokio::test]
async fn rejected_payment_move_keeps_status() {
    let app = api::router(test_state().await);
    let car_id = create_car(&app, "Verona", "45").await;
    let (_, booking) = book(&app, &car_id, "2025-07-10", "2025-07-12").await;
    let uri = format!("/bookings/{}", booking["id"].as_str().unwrap());

    let (status, body) = send(
        &app,
        "PUT",
        &uri,
        Some(json!({ "status": "confirmed", "paymentStatus": "refunded" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "illegal_transition");

    let (_, stored) = send(&app, "GET", &uri, None).await;
    assert_eq!(stored["status"], "pending");
    assert_eq!(stored["paymentStatus"], "pending");
}

#[tokio::test]
async fn delete_car_policy() {
    let app = api::router(test_state().await);
    let car_id = create_car(&app, "Genova", "35").await;
    let (_, booking) = book(&app, &car_id, "2025-08-01", "2025-08-02").await;

    let (status, body) = send(&app, "DELETE", &format!("/cars/{car_id}"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "vehicle_has_active_bookings");

    let booking_uri = format!("/bookings/{}", booking["id"].as_str().unwrap());
    send(&app, "DELETE", &booking_uri, None).await;
    let (status, _) = send(&app, "DELETE", &format!("/cars/{car_id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "GET", &format!("/cars/{car_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "GET", &booking_uri, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn update_car_and_unlist() {
    let app = api::router(test_state().await);
    let car_id = create_car(&app, "Pisa", "20").await;
    let uri = format!("/cars/{car_id}");

    let (status, body) = send(
        &app,
        "PUT",
        &uri,
        Some(json!({ "pricePerDay": 33, "isAvailable": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pricePerDay"]["amount"], "33");
    assert_eq!(body["pricePerDay"]["currency"], "EUR");
    assert_eq!(body["isAvailable"], false);

    let (_, body) = send(&app, "GET", "/cars", None).await;
    assert_eq!(body["total"], 0);
    let (_, body) = send(&app, "GET", "/owners/owner-1/cars", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = book(&app, &car_id, "2025-09-01", "2025-09-02").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "vehicle_unavailable");
}

struct FixedProfiles;

#[async_trait]
impl ProfileDirectory for FixedProfiles {
    async fn owner_summary(&self, owner_id: &str) -> Option<OwnerSummary> {
        Some(OwnerSummary {
            id: owner_id.to_string(),
            name: "Giulia".into(),
            avatar: None,
        })
    }

    async fn vehicle_rating(&self, _vehicle_id: Ulid) -> Option<RatingSummary> {
        Some(RatingSummary {
            average: 4.5,
            count: 12,
        })
    }
}

#[tokio::test]
async fn detail_is_enriched_from_profiles() {
    let state = test_state().await.with_profiles(Arc::new(FixedProfiles));
    let app = api::router(state);
    let id = create_car(&app, "Verona", "60").await;

    let (status, body) = send(&app, "GET", &format!("/cars/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["owner"]["name"], "Giulia");
    assert_eq!(body["owner"]["id"], "owner-1");
    assert_eq!(body["rating"]["count"], 12);
    assert_eq!(body["make"], "Fiat");
}
