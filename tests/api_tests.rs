//! Integration tests for the room API.
//!
//! Requests are driven through the axum `Router` with `tower::ServiceExt`,
//! backed by the in-memory store, so no TCP listener or database is needed.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{Request, Response, StatusCode};
use serde_json::{json, Value};
use spin_decide::config::StorageBackend;
use spin_decide::store::MemoryStore;
use spin_decide::web::app::build_router;
use spin_decide::web::state::AppState;
use spin_decide::AppConfig;
use tower::ServiceExt;

fn make_test_state() -> AppState {
    make_state_with(AppConfig {
        storage: StorageBackend::Memory,
        ..AppConfig::default()
    })
}

fn make_state_with(config: AppConfig) -> AppState {
    AppState::new(config, Arc::new(MemoryStore::new()))
}

async fn send(state: &AppState, request: Request<Body>) -> Response<Body> {
    build_router(state.clone()).oneshot(request).await.unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value, session: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(uri).header(CONTENT_TYPE, "application/json");
    if let Some(token) = session {
        builder = builder.header(COOKIE, format!("spin_session={}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn set_cookie(response: &Response<Body>) -> String {
    response
        .headers()
        .get(SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

fn session_token(response: &Response<Body>) -> String {
    let cookie = set_cookie(response);
    let pair = cookie.split(';').next().unwrap();
    pair.strip_prefix("spin_session=").unwrap().to_string()
}

async fn assert_error(response: Response<Body>, status: StatusCode, code: &str) {
    assert_eq!(response.status(), status);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"]["code"], code);
    assert!(json["error"]["message"].is_string());
}

/// Creates a room and returns `(code, host_token)`.
async fn create_room(state: &AppState, host: &str) -> (String, String) {
    let response = send(
        state,
        post("/api/rooms", json!({"category": "eat", "hostName": host}), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let token = session_token(&response);
    let json = body_to_json(response.into_body()).await;
    (json["code"].as_str().unwrap().to_string(), token)
}

async fn join_room(state: &AppState, code: &str, name: &str) -> String {
    let response = send(
        state,
        post(&format!("/api/rooms/{}/join", code), json!({"name": name}), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    session_token(&response)
}

async fn add_option(state: &AppState, code: &str, token: &str, text: &str) -> i64 {
    let response = send(
        state,
        post(
            &format!("/api/rooms/{}/options", code),
            json!({"text": text}),
            Some(token),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    json["option"]["id"].as_i64().unwrap()
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_health() {
    let state = make_test_state();
    let response = send(&state, get("/api/health")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_create_room_sets_session_cookie() {
    let state = make_test_state();
    let response = send(
        &state,
        post(
            "/api/rooms",
            json!({"category": "watch", "hostName": "  Al  "}),
            None,
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = set_cookie(&response);
    assert!(cookie.starts_with("spin_session="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Path=/"));
    assert!(cookie.contains("Max-Age=86400"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(!cookie.contains("Secure"));
    assert_eq!(session_token(&response).len(), 64);

    let json = body_to_json(response.into_body()).await;
    let code = json["code"].as_str().unwrap();
    assert_eq!(code.len(), 6);

    let response = send(&state, get(&format!("/api/rooms/{}", code))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["room"]["code"], code);
    assert_eq!(json["room"]["category"], "watch");
    assert_eq!(json["room"]["status"], "gathering");
    assert!(json["room"]["winner_option_id"].is_null());
    assert_eq!(json["participants"][0]["name"], "Al");
    assert_eq!(json["participants"][0]["is_host"], true);
    assert_eq!(json["options"], json!([]));
}

#[tokio::test]
async fn test_production_cookie_is_secure() {
    let state = make_state_with(AppConfig {
        env: "production".to_string(),
        storage: StorageBackend::Memory,
        ..AppConfig::default()
    });
    let response = send(
        &state,
        post("/api/rooms", json!({"category": "do", "hostName": "Al"}), None),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response).contains("Secure"));
}

#[tokio::test]
async fn test_create_room_validation() {
    let state = make_test_state();

    let response = send(
        &state,
        post("/api/rooms", json!({"category": "sleep", "hostName": "Al"}), None),
    )
    .await;
    assert_error(response, StatusCode::BAD_REQUEST, "INVALID_CATEGORY").await;

    let response = send(&state, post("/api/rooms", json!({"category": "eat"}), None)).await;
    assert_error(response, StatusCode::BAD_REQUEST, "INVALID_NAME").await;
}

#[tokio::test]
async fn test_unreadable_body_is_json_error() {
    let state = make_test_state();

    let malformed = Request::post("/api/rooms")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{\"category\": \"eat\","))
        .unwrap();
    let response = send(&state, malformed).await;
    assert_error(response, StatusCode::BAD_REQUEST, "INVALID_REQUEST").await;

    let no_content_type = Request::post("/api/rooms")
        .body(Body::from(json!({"category": "eat", "hostName": "Al"}).to_string()))
        .unwrap();
    let response = send(&state, no_content_type).await;
    assert_error(response, StatusCode::BAD_REQUEST, "INVALID_REQUEST").await;

    let (code, token) = create_room(&state, "Al").await;
    let response = send(
        &state,
        post(
            &format!("/api/rooms/{}/options", code),
            json!({"text": 42}),
            Some(&token),
        ),
    )
    .await;
    assert_error(response, StatusCode::BAD_REQUEST, "INVALID_REQUEST").await;
}

#[tokio::test]
async fn test_room_lookup_errors() {
    let state = make_test_state();

    let response = send(&state, get("/api/rooms/abc")).await;
    assert_error(response, StatusCode::BAD_REQUEST, "INVALID_ROOM_CODE").await;

    let response = send(&state, get("/api/rooms/ZZZZZZ")).await;
    assert_error(response, StatusCode::NOT_FOUND, "ROOM_NOT_FOUND").await;
}

#[tokio::test]
async fn test_join_duplicate_name() {
    let state = make_test_state();
    let (code, _) = create_room(&state, "Al").await;

    let response = send(
        &state,
        post(&format!("/api/rooms/{}/join", code), json!({"name": "Al"}), None),
    )
    .await;
    assert_error(response, StatusCode::BAD_REQUEST, "DUPLICATE_NAME").await;

    let response = send(
        &state,
        post(&format!("/api/rooms/{}/join", code), json!({"name": "Bea"}), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response).starts_with("spin_session="));
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["success"], true);
}

#[tokio::test]
async fn test_add_option_requires_session() {
    let state = make_test_state();
    let (code, _) = create_room(&state, "Al").await;
    let uri = format!("/api/rooms/{}/options", code);

    let response = send(&state, post(&uri, json!({"text": "Pizza"}), None)).await;
    assert_error(response, StatusCode::UNAUTHORIZED, "NOT_AUTHENTICATED").await;

    let response = send(&state, post(&uri, json!({"text": "Pizza"}), Some("nope"))).await;
    assert_error(response, StatusCode::UNAUTHORIZED, "INVALID_SESSION").await;

    let bogus = "ab".repeat(32);
    let response = send(&state, post(&uri, json!({"text": "Pizza"}), Some(&bogus))).await;
    assert_error(response, StatusCode::UNAUTHORIZED, "INVALID_SESSION").await;
}

#[tokio::test]
async fn test_session_does_not_cross_rooms() {
    let state = make_test_state();
    let (_, token_a) = create_room(&state, "Al").await;
    let (code_b, _) = create_room(&state, "Bea").await;

    let response = send(
        &state,
        post(
            &format!("/api/rooms/{}/options", code_b),
            json!({"text": "Pizza"}),
            Some(&token_a),
        ),
    )
    .await;
    assert_error(response, StatusCode::NOT_FOUND, "ROOM_NOT_FOUND").await;
}

#[tokio::test]
async fn test_option_limit() {
    let state = make_test_state();
    let (code, host) = create_room(&state, "Al").await;

    for text in ["Pizza", "Sushi", "Tacos"] {
        add_option(&state, &code, &host, text).await;
    }

    let response = send(
        &state,
        post(
            &format!("/api/rooms/{}/options", code),
            json!({"text": "Ramen"}),
            Some(&host),
        ),
    )
    .await;
    assert_error(response, StatusCode::BAD_REQUEST, "OPTION_LIMIT_REACHED").await;
}

#[tokio::test]
async fn test_veto_errors() {
    let state = make_test_state();
    let (code, host) = create_room(&state, "Al").await;
    let bea = join_room(&state, &code, "Bea").await;
    let pizza = add_option(&state, &code, &host, "Pizza").await;
    let sushi = add_option(&state, &code, &host, "Sushi").await;

    let veto = |option: String| format!("/api/rooms/{}/options/{}/veto", code, option);

    let response = send(&state, post(&veto("abc".into()), json!({}), Some(&bea))).await;
    assert_error(response, StatusCode::BAD_REQUEST, "INVALID_OPTION_ID").await;

    let response = send(&state, post(&veto(pizza.to_string()), json!({}), Some(&host))).await;
    assert_error(response, StatusCode::BAD_REQUEST, "CANNOT_VETO_OWN").await;

    let response = send(&state, post(&veto("999999".into()), json!({}), Some(&bea))).await;
    assert_error(response, StatusCode::NOT_FOUND, "OPTION_NOT_FOUND").await;

    let response = send(&state, post(&veto(pizza.to_string()), json!({}), Some(&bea))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert!(json["message"].is_string());

    let response = send(&state, post(&veto(sushi.to_string()), json!({}), Some(&bea))).await;
    assert_error(response, StatusCode::BAD_REQUEST, "ALREADY_USED_VETO").await;
}

#[tokio::test]
async fn test_only_host_can_spin() {
    let state = make_test_state();
    let (code, host) = create_room(&state, "Al").await;
    let bea = join_room(&state, &code, "Bea").await;
    add_option(&state, &code, &host, "Pizza").await;
    add_option(&state, &code, &bea, "Sushi").await;

    let response = send(
        &state,
        post(&format!("/api/rooms/{}/spin", code), json!({}), Some(&bea)),
    )
    .await;
    assert_error(response, StatusCode::FORBIDDEN, "NOT_HOST").await;
}

#[tokio::test]
async fn test_full_decision_flow() {
    let state = make_test_state();
    let (code, host) = create_room(&state, "Al").await;
    let bea = join_room(&state, &code, "Bea").await;
    let cy = join_room(&state, &code, "Cy").await;

    let pizza = add_option(&state, &code, &host, "Pizza").await;
    add_option(&state, &code, &bea, "Sushi").await;
    add_option(&state, &code, &cy, "Tacos").await;

    let response = send(
        &state,
        post(
            &format!("/api/rooms/{}/options/{}/veto", code, pizza),
            json!({}),
            Some(&bea),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        &state,
        post(&format!("/api/rooms/{}/spin", code), json!({}), Some(&host)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let spin = body_to_json(response.into_body()).await;
    assert_eq!(spin["totalOptions"], 2);
    assert_eq!(spin["allOptions"].as_array().unwrap().len(), 2);
    let index = spin["winnerIndex"].as_u64().unwrap() as usize;
    assert_eq!(spin["allOptions"][index]["id"], spin["winner"]["id"]);
    assert_ne!(spin["winner"]["id"], pizza);
    assert!(spin["winner"]["participant_name"].is_string());
    assert!(spin["message"].is_string());

    let response = send(&state, get(&format!("/api/rooms/{}", code))).await;
    let room = body_to_json(response.into_body()).await;
    assert_eq!(room["room"]["status"], "decided");
    assert_eq!(room["room"]["winner_option_id"], spin["winner"]["id"]);

    let response = send(
        &state,
        post(&format!("/api/rooms/{}/spin", code), json!({}), Some(&host)),
    )
    .await;
    assert_error(response, StatusCode::BAD_REQUEST, "ALREADY_SPUN").await;

    let response = send(
        &state,
        post(
            &format!("/api/rooms/{}/options", code),
            json!({"text": "Ramen"}),
            Some(&cy),
        ),
    )
    .await;
    assert_error(response, StatusCode::BAD_REQUEST, "ROOM_LOCKED").await;

    let response = send(&state, get("/api/recent")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let recent = body_to_json(response.into_body()).await;
    assert_eq!(recent.as_array().unwrap().len(), 1);
    assert_eq!(recent[0]["code"], code.as_str());
    assert_eq!(recent[0]["participant_count"], 3);
    assert_eq!(recent[0]["winner_text"], spin["winner"]["text"]);
}

#[tokio::test]
async fn test_spin_needs_two_options() {
    let state = make_test_state();
    let (code, host) = create_room(&state, "Al").await;
    add_option(&state, &code, &host, "Pizza").await;

    let response = send(
        &state,
        post(&format!("/api/rooms/{}/spin", code), json!({}), Some(&host)),
    )
    .await;
    assert_error(response, StatusCode::BAD_REQUEST, "INSUFFICIENT_OPTIONS").await;
}

#[tokio::test]
async fn test_create_room_rate_limited_per_client() {
    let state = make_test_state();
    let create = |ip: &str| {
        Request::post("/api/rooms")
            .header(CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", ip)
            .body(Body::from(
                json!({"category": "eat", "hostName": "Al"}).to_string(),
            ))
            .unwrap()
    };

    for _ in 0..5 {
        let response = send(&state, create("203.0.113.9")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = send(&state, create("203.0.113.9, 10.0.0.1")).await;
    assert_error(response, StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED").await;

    let response = send(&state, create("198.51.100.4")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_route() {
    let state = make_test_state();
    let response = send(&state, get("/api/nothing-here")).await;
    assert_error(response, StatusCode::NOT_FOUND, "NOT_FOUND").await;
}
