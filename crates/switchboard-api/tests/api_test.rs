//! Integration tests for the operator API

use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::post,
    Json, Router,
};
use chrono::NaiveDate;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use switchboard_api::{
    middleware::rate_limited, models::*, ApiServer, ApiServerConfig, AppState,
};
use switchboard_control::{
    presence_key, ControlChannel, ControlMessage, OperationClass, PresenceRegistry,
    SlidingWindowLimiter,
};
use switchboard_db::entities::tunnel;
use switchboard_store::MemoryStore;
use tower::ServiceExt; // For `oneshot` method

/// Helper to create an in-memory database with migrations applied
async fn create_test_db() -> DatabaseConnection {
    let db = switchboard_db::connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    switchboard_db::migrate(&db)
        .await
        .expect("Failed to run migrations");

    db
}

async fn insert_tunnel(db: &DatabaseConnection, id: &str, url: &str, protocol: &str) {
    let created = NaiveDate::from_ymd_opt(2026, 3, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    tunnel::ActiveModel {
        id: Set(id.to_string()),
        user_id: Set("user-1".to_string()),
        organization_id: Set(None),
        name: Set(Some("demo".to_string())),
        url: Set(url.to_string()),
        protocol: Set(protocol.to_string()),
        last_seen_at: Set(Some(created)),
        created_at: Set(created),
        updated_at: Set(created),
    }
    .insert(db)
    .await
    .expect("Failed to insert tunnel");
}

/// Helper to create a test API server over a shared in-memory store
fn create_test_server(db: DatabaseConnection, store: Arc<MemoryStore>) -> ApiServer {
    let config = ApiServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(), // Random port
        enable_cors: true,
    };

    let state = AppState {
        registry: PresenceRegistry::new(store.clone()),
        channel: ControlChannel::new(store.clone()),
        limiter: SlidingWindowLimiter::new(store),
        db,
    };

    ApiServer::new(config, state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-forwarded-for", "198.51.100.4")
        .body(Body::empty())
        .unwrap()
}

fn post_req(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("POST")
        .header("x-forwarded-for", "198.51.100.4")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_status_of_online_http_tunnel() {
    let db = create_test_db().await;
    let store = Arc::new(MemoryStore::new());
    insert_tunnel(&db, "tun-1", "https://pretty-cake.example.app", "http").await;
    store.set_with_ttl(
        presence_key("pretty-cake.example.app"),
        Some(Duration::from_secs(60)),
    );

    let app = create_test_server(db, store).build_router();
    let response = app.oneshot(get("/api/tunnels/tun-1")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["tunnel"]["id"], "tun-1");
    assert_eq!(body["tunnel"]["url"], "https://pretty-cake.example.app");
    assert_eq!(body["tunnel"]["userId"], "user-1");
    assert_eq!(body["tunnel"]["isOnline"], true);
    assert_eq!(body["tunnel"]["createdAt"], "2026-03-01T12:00:00Z");
    assert_eq!(body["tunnel"]["lastSeenAt"], "2026-03-01T12:00:00Z");
}

#[tokio::test]
async fn test_status_of_tcp_tunnel_uses_subdomain_label() {
    let db = create_test_db().await;
    let store = Arc::new(MemoryStore::new());
    insert_tunnel(&db, "tun-2", "tcp://pretty-cake.example.app:20001", "tcp").await;
    store.set_with_ttl(presence_key("pretty-cake"), Some(Duration::from_secs(60)));

    let app = create_test_server(db, store).build_router();
    let response = app.oneshot(get("/api/tunnels/tun-2")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let status: TunnelStatusResponse = serde_json::from_value(body_json(response).await).unwrap();
    assert!(status.tunnel.is_online);
}

#[tokio::test]
async fn test_status_of_offline_tunnel() {
    let db = create_test_db().await;
    let store = Arc::new(MemoryStore::new());
    insert_tunnel(&db, "tun-3", "https://sleepy.example.app", "http").await;

    let app = create_test_server(db, store).build_router();
    let response = app.oneshot(get("/api/tunnels/tun-3")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["tunnel"]["isOnline"], false);
}

#[tokio::test]
async fn test_status_of_unknown_tunnel() {
    let db = create_test_db().await;
    let app = create_test_server(db, Arc::new(MemoryStore::new())).build_router();

    let response = app.oneshot(get("/api/tunnels/missing")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error: ErrorResponse = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(error.error, "Tunnel not found");
}

#[tokio::test]
async fn test_stop_publishes_kill_for_resolved_identifier() {
    let db = create_test_db().await;
    let store = Arc::new(MemoryStore::new());
    insert_tunnel(&db, "tun-4", "tcp://pretty-cake.example.app:20001", "tcp").await;

    let mut edge = ControlChannel::new(store.clone()).subscribe().await.unwrap();

    let app = create_test_server(db, store).build_router();
    let response = app.oneshot(post_req("/api/tunnels/tun-4/stop")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "message": "Tunnel stopped" })
    );

    let message = tokio::time::timeout(Duration::from_secs(1), edge.next_message())
        .await
        .unwrap();
    assert_eq!(message, Some(ControlMessage::Kill("pretty-cake".to_string())));
}

#[tokio::test]
async fn test_stop_unknown_tunnel() {
    let db = create_test_db().await;
    let store = Arc::new(MemoryStore::new());
    let mut edge = ControlChannel::new(store.clone()).subscribe().await.unwrap();

    let app = create_test_server(db, store).build_router();
    let response = app
        .oneshot(post_req("/api/tunnels/missing/stop"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Nothing was published
    let message = tokio::time::timeout(Duration::from_millis(50), edge.next_message()).await;
    assert!(message.is_err());
}

#[tokio::test]
async fn test_health_reports_online_count() {
    let db = create_test_db().await;
    let store = Arc::new(MemoryStore::new());
    for name in ["a.example.app", "b.example.app", "c"] {
        store.set_with_ttl(presence_key(name), Some(Duration::from_secs(60)));
    }
    store.set_with_ttl("session:xyz", None);

    let app = create_test_server(db, store).build_router();
    let response = app.oneshot(get("/api/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let health: HealthResponse = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.active_tunnels, 3);
}

#[tokio::test]
async fn test_health_applies_general_limit() {
    let db = create_test_db().await;
    let store = Arc::new(MemoryStore::new());
    store.set_with_ttl(presence_key("a.example.app"), None);

    let app = create_test_server(db, store.clone()).build_router();

    for _ in 0..100 {
        let response = app.clone().oneshot(get("/api/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let rounds_before = store.scan_rounds();
    let response = app.oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["x-ratelimit-limit"], "100");

    // The rejected request never reached the registry
    assert_eq!(store.scan_rounds(), rounds_before);
}

#[tokio::test]
async fn test_tunnel_routes_apply_general_limit() {
    let db = create_test_db().await;
    let app = create_test_server(db, Arc::new(MemoryStore::new())).build_router();

    for _ in 0..100 {
        let response = app.clone().oneshot(get("/api/tunnels/missing")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    let response = app.clone().oneshot(get("/api/tunnels/missing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Another caller has its own budget
    let request = Request::builder()
        .uri("/api/tunnels/missing")
        .header("x-real-ip", "203.0.113.9")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_tunnel_auth_limit_end_to_end() {
    let store = Arc::new(MemoryStore::new());
    let limiter = SlidingWindowLimiter::new(store);

    let app = rate_limited(
        Router::new().route("/auth", post(|| async { Json(json!({ "ok": true })) })),
        limiter,
        OperationClass::TunnelAuth,
    );

    let auth_request = || {
        Request::builder()
            .uri("/auth")
            .method("POST")
            .header("x-forwarded-for", "1.2.3.4, 10.0.0.1")
            .body(Body::empty())
            .unwrap()
    };

    for _ in 0..30 {
        let response = app.clone().oneshot(auth_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.oneshot(auth_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let headers = response.headers().clone();
    assert_eq!(headers["x-ratelimit-limit"], "30");
    assert_eq!(headers["x-ratelimit-remaining"], "0");
    assert!(headers.contains_key("x-ratelimit-reset"));
    assert!(headers.contains_key("retry-after"));

    let body: RateLimitedResponse = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(body.error, "Too many requests");
    assert!(body.retry_after >= 1 && body.retry_after <= 60);
}
