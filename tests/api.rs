use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use futures::future::join_all;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

use bus_booking::{app, config::Config, AppState};

const ADMIN: &str = "root";
const ADMIN_PASSWORD: &str = "root-password";

async fn test_app() -> Router {
    let mut config = Config::in_memory();
    config.admin.username = Some(ADMIN.to_string());
    config.admin.password = Some(ADMIN_PASSWORD.to_string());
    let state = AppState::new(config).await.expect("state");
    app(state)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let (status, _, value) = send_raw(app, method, uri, token, body).await;
    (status, value)
}

async fn send_raw(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, axum::http::HeaderMap, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, headers, value)
}

/// Registers `username` and returns (token, user_id).
async fn register(app: &Router, username: &str) -> (String, i64) {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/register",
        None,
        Some(json!({ "username": username, "password": "pass-word-123" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    login(app, username, "pass-word-123").await
}

async fn login(app: &Router, username: &str, password: &str) -> (String, i64) {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/login",
        None,
        Some(json!({ "username": username, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    (
        body["token"].as_str().unwrap().to_string(),
        body["user_id"].as_i64().unwrap(),
    )
}

async fn admin_token(app: &Router) -> String {
    login(app, ADMIN, ADMIN_PASSWORD).await.0
}

/// Creates a bus priced 500.00 with the given seats and returns its id.
async fn create_bus(app: &Router, number: &str, seats: &[&str]) -> i64 {
    let token = admin_token(app).await;
    let (status, body) = send(
        app,
        Method::POST,
        "/api/buses",
        Some(&token),
        Some(json!({
            "bus_name": "Coastal Express",
            "bus_number": number,
            "origin": "Mumbai",
            "destination": "Goa",
            "features": "AC, Sleeper",
            "start_time": "21:00:00",
            "end_time": "07:30:00",
            "no_of_seats": seats.len(),
            "price": "500.00",
            "seat_numbers": seats,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].as_i64().unwrap()
}

async fn seat_availability(app: &Router, bus_id: i64) -> Vec<(String, bool)> {
    let (status, body) = send(app, Method::GET, &format!("/api/buses/{}/seats", bus_id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    body.as_array()
        .unwrap()
        .iter()
        .map(|s| {
            (
                s["seat_number"].as_str().unwrap().to_string(),
                s["is_available"].as_bool().unwrap(),
            )
        })
        .collect()
}

async fn book(app: &Router, token: &str, bus_id: i64, seats: &[&str]) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        "/api/bookings",
        Some(token),
        Some(json!({ "bus_id": bus_id, "seats": seats })),
    )
    .await
}

fn is_ticket_code(code: &str) -> bool {
    code.len() == 12
        && code.starts_with("TKT-")
        && code[4..].chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
}

#[tokio::test]
async fn health_endpoints() {
    let app = test_app().await;
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn register_validation_and_login_errors() {
    let app = test_app().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/register",
        None,
        Some(json!({ "username": "no spaces allowed", "password": "short" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["username"].is_array());
    assert!(body["fields"]["password"].is_array());

    let (token, _) = register(&app, "alice").await;
    let (again, _) = login(&app, "alice", "pass-word-123").await;
    assert_eq!(token, again);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/register",
        None,
        Some(json!({ "username": "alice", "password": "another-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["username"].is_array());

    let wrong = send(
        &app,
        Method::POST,
        "/api/login",
        None,
        Some(json!({ "username": "alice", "password": "nope-nope" })),
    )
    .await;
    let unknown = send(
        &app,
        Method::POST,
        "/api/login",
        None,
        Some(json!({ "username": "mallory", "password": "pass-word-123" })),
    )
    .await;
    assert_eq!(wrong.0, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong, unknown);
    assert_eq!(wrong.1["error"], "Invalid Credentials");
}

#[tokio::test]
async fn bus_catalog_requires_staff_for_writes() {
    let app = test_app().await;
    let (user_token, _) = register(&app, "alice").await;
    let payload = json!({
        "bus_name": "Night Rider",
        "bus_number": "KA-07",
        "origin": "Bengaluru",
        "destination": "Chennai",
        "start_time": "22:00",
        "end_time": "05:00",
        "no_of_seats": 3,
        "price": 800
    });

    let (status, _) = send(&app, Method::POST, "/api/buses", None, Some(payload.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, Method::POST, "/api/buses", Some(&user_token), Some(payload.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = admin_token(&app).await;
    let (status, bus) = send(&app, Method::POST, "/api/buses", Some(&admin), Some(payload.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(bus["price"], "800.00");
    let id = bus["id"].as_i64().unwrap();

    let (status, dup) = send(&app, Method::POST, "/api/buses", Some(&admin), Some(payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(dup["fields"]["bus_number"].is_array());

    let seats = seat_availability(&app, id).await;
    assert_eq!(
        seats,
        vec![("1".into(), true), ("2".into(), true), ("3".into(), true)]
    );

    let (status, list) = send(&app, Method::GET, "/api/buses", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, patched) = send(
        &app,
        Method::PATCH,
        &format!("/api/buses/{}", id),
        Some(&admin),
        Some(json!({ "destination": "Pondicherry" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["destination"], "Pondicherry");
    assert_eq!(patched["origin"], "Bengaluru");

    let (status, _) = send(&app, Method::DELETE, &format!("/api/buses/{}", id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::GET, &format!("/api/buses/{}", id), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn booking_reserves_all_requested_seats() {
    let app = test_app().await;
    let bus_id = create_bus(&app, "MH-01", &["A1", "A2", "A3"]).await;
    let (token, _) = register(&app, "alice").await;

    let (status, body) = book(&app, &token, bus_id, &["A1", "A2"]).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert!(is_ticket_code(body["ticket_id"].as_str().unwrap()));
    assert_eq!(body["seats"], json!(["A1", "A2"]));
    assert_eq!(body["price_per_seat"], "500.00");
    assert_eq!(body["total_price"], "1000.00");
    assert_eq!(body["bus_number"], "MH-01");
    assert_eq!(body["message"], "2 seat(s) booked successfully!");
    assert!(body["booking_time"].is_string());

    let seats = seat_availability(&app, bus_id).await;
    assert_eq!(
        seats,
        vec![("A1".into(), false), ("A2".into(), false), ("A3".into(), true)]
    );
}

#[tokio::test]
async fn failed_booking_changes_nothing() {
    let app = test_app().await;
    let bus_id = create_bus(&app, "MH-01", &["A1", "A2"]).await;
    let (alice, alice_id) = register(&app, "alice").await;
    let (bob, bob_id) = register(&app, "bob").await;

    let (status, _) = book(&app, &alice, bus_id, &["A1"]).await;
    assert_eq!(status, StatusCode::CREATED);

    // A1 is taken and A3 does not exist
    let (status, body) = book(&app, &bob, bus_id, &["A1", "A3"]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "One or more seats do not exist or are already booked.");

    // A2 is free, A3 does not exist: A2 must stay free
    let (status, _) = book(&app, &bob, bus_id, &["A2", "A3"]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let seats = seat_availability(&app, bus_id).await;
    assert_eq!(seats, vec![("A1".into(), false), ("A2".into(), true)]);

    let (_, bob_bookings) = send(&app, Method::GET, &format!("/api/users/{}/bookings", bob_id), Some(&bob), None).await;
    assert_eq!(bob_bookings["message"], "No bookings found.");

    let (_, alice_bookings) =
        send(&app, Method::GET, &format!("/api/users/{}/bookings", alice_id), Some(&alice), None).await;
    assert_eq!(alice_bookings.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn repeated_request_does_not_succeed_twice() {
    let app = test_app().await;
    let bus_id = create_bus(&app, "MH-01", &["A1", "A2"]).await;
    let (token, _) = register(&app, "alice").await;

    let (first, _) = book(&app, &token, bus_id, &["A1", "A2"]).await;
    let (second, _) = book(&app, &token, bus_id, &["A1", "A2"]).await;
    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(second, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn concurrent_requests_for_one_seat_have_one_winner() {
    let app = test_app().await;
    let bus_id = create_bus(&app, "MH-01", &["A1"]).await;

    let mut tokens = Vec::new();
    for i in 0..8 {
        tokens.push(register(&app, &format!("rider{}", i)).await.0);
    }

    let attempts = tokens.iter().map(|token| {
        let app = app.clone();
        let token = token.clone();
        tokio::spawn(async move { book(&app, &token, bus_id, &["A1"]).await.0 })
    });
    let statuses: Vec<StatusCode> = join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let winners = statuses.iter().filter(|s| **s == StatusCode::CREATED).count();
    let losers = statuses.iter().filter(|s| **s == StatusCode::BAD_REQUEST).count();
    assert_eq!(winners, 1);
    assert_eq!(losers, statuses.len() - 1);
}

#[tokio::test]
async fn booking_input_errors() {
    let app = test_app().await;
    let bus_id = create_bus(&app, "MH-01", &["A1"]).await;
    let (token, _) = register(&app, "alice").await;

    let (status, _) = book(&app, &token, bus_id + 1000, &["A1"]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = book(&app, &token, bus_id, &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Please provide a list of seat numbers.");

    let (status, body) = send(&app, Method::POST, "/api/bookings", Some(&token), Some(json!({ "seats": ["A1"] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Please provide bus_id.");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/bookings",
        Some(&token),
        Some(json!({ "bus_id": bus_id, "seats": "A1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Please provide a list of seat numbers.");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/bookings",
        Some(&token),
        Some(json!({ "bus_id": "not-a-number", "seats": ["A1"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Please provide bus_id.");

    // a numeric string is as good as a number
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/bookings",
        Some(&token),
        Some(json!({ "bus_id": bus_id.to_string(), "seats": ["A1"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    let (status, _) = book(&app, "not-a-real-token", bus_id, &["A1"]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bookings_are_grouped_per_ticket_newest_first() {
    let app = test_app().await;
    let bus_id = create_bus(&app, "MH-01", &["A1", "A2", "A3"]).await;
    let (token, user_id) = register(&app, "alice").await;

    let (_, first) = book(&app, &token, bus_id, &["A1", "A2"]).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let (_, second) = book(&app, &token, bus_id, &["A3"]).await;

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/users/{}/bookings", user_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let tickets = body.as_array().unwrap();
    assert_eq!(tickets.len(), 2);

    assert_eq!(tickets[0]["ticket_id"], second["ticket_id"]);
    assert_eq!(tickets[0]["seats"], json!(["A3"]));
    assert_eq!(tickets[0]["total_price"], "500.00");

    assert_eq!(tickets[1]["ticket_id"], first["ticket_id"]);
    assert_eq!(tickets[1]["seats"].as_array().unwrap().len(), 2);
    assert_eq!(tickets[1]["total_price"], "1000.00");
    assert_eq!(tickets[1]["origin"], "Mumbai");
}

#[tokio::test]
async fn users_only_see_their_own_data() {
    let app = test_app().await;
    let (alice, alice_id) = register(&app, "alice").await;
    let (bob, bob_id) = register(&app, "bob").await;

    let (status, body) = send(&app, Method::GET, &format!("/api/users/{}/bookings", alice_id), Some(&bob), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.get("message").is_none());

    let (status, body) = send(&app, Method::GET, &format!("/api/users/{}", alice_id), Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.get("username").is_none());

    let (status, body) = send(&app, Method::GET, &format!("/api/users/{}", alice_id), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert!(body.get("password_hash").is_none());

    let (status, _) = send(&app, Method::GET, &format!("/api/users/{}", bob_id), None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let admin = admin_token(&app).await;
    let (status, body) = send(&app, Method::GET, &format!("/api/users/{}", bob_id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "bob");
    let (status, _) = send(&app, Method::GET, "/api/users/999999", Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_reset_frees_seats_and_redirects() {
    let app = test_app().await;
    let bus_id = create_bus(&app, "MH-01", &["A1", "A2"]).await;
    let (token, user_id) = register(&app, "alice").await;
    book(&app, &token, bus_id, &["A1", "A2"]).await;

    let uri = format!("/api/admin/buses/{}/reset-seats", bus_id);
    let (status, _) = send(&app, Method::POST, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = admin_token(&app).await;
    let (status, headers, _) = send_raw(&app, Method::POST, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(
        headers.get(header::LOCATION).unwrap(),
        &format!("/api/admin/buses/{}/change", bus_id)
    );

    let seats = seat_availability(&app, bus_id).await;
    assert!(seats.iter().all(|(_, available)| *available));

    // bookings are left as they were
    let (_, history) = send(&app, Method::GET, &format!("/api/users/{}/bookings", user_id), Some(&token), None).await;
    assert_eq!(history.as_array().unwrap().len(), 1);

    let (status, page) = send(&app, Method::GET, &format!("/api/admin/buses/{}/change", bus_id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["seats"].as_array().unwrap().len(), 2);

    let (status, _) = send(&app, Method::POST, "/api/admin/buses/424242/reset-seats", Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_list_views() {
    let app = test_app().await;
    let bus_id = create_bus(&app, "MH-01", &["A1"]).await;
    create_bus(&app, "KA-07", &["B1"]).await;
    let (token, _) = register(&app, "alice").await;
    book(&app, &token, bus_id, &["A1"]).await;
    let admin = admin_token(&app).await;

    let (status, buses) = send(&app, Method::GET, "/api/admin/buses?search=ka-", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(buses.as_array().unwrap().len(), 1);
    assert_eq!(buses[0]["bus_number"], "KA-07");

    let (status, added) = send(
        &app,
        Method::POST,
        &format!("/api/admin/buses/{}/seats", bus_id),
        Some(&admin),
        Some(json!({ "seats": ["A2", 3] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(added.as_array().unwrap().len(), 2);

    let (status, seats) = send(&app, Method::GET, &format!("/api/admin/seats?bus_id={}", bus_id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(seats.as_array().unwrap().len(), 3);

    let (status, bookings) = send(&app, Method::GET, "/api/admin/bookings", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bookings[0]["user"], "alice");
    assert_eq!(bookings[0]["price"], "500.00");

    let (status, _) = send(&app, Method::GET, "/api/admin/bookings", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
