//! End-to-end tests through the axum adapter.
//!
//! Uses `tower::ServiceExt::oneshot` so no TCP port is bound; every test gets
//! a fresh in-memory store.

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::extract::ConnectInfo;
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use switchyard_core::error::ERROR_CODE_HEADER;
use switchyard_core::{DispatchTable, RouteAuth, SwitchyardConfig};
use switchyard_middleware::{AuthError, AuthValidator, Resources};
use switchyard_pipeline::{CompiledRouter, MiddlewareRegistry};
use switchyard_server::{AppState, build_app, routes};
use switchyard_store::MemoryStore;
use tower::ServiceExt; // .oneshot()

// ── Helpers ───────────────────────────────────────────────────

/// Accepts exactly `Bearer letmein`.
struct StaticValidator;

#[async_trait]
impl AuthValidator for StaticValidator {
    async fn validate(&self, token: &str, auth: &RouteAuth) -> Result<Value, AuthError> {
        if token == "Bearer letmein" {
            Ok(json!({"user": "ann", "permission": auth.permission}))
        } else {
            Err(AuthError::Rejected {
                status: StatusCode::UNAUTHORIZED,
                content_type: None,
                body: Default::default(),
            })
        }
    }
}

struct TestApp {
    app: axum::Router,
    store: MemoryStore,
}

fn make_app_with(config: SwitchyardConfig) -> TestApp {
    let store = MemoryStore::new();
    let resources = Resources {
        store: Arc::new(store.clone()),
        validator: Arc::new(StaticValidator),
    };
    let mut registry = MiddlewareRegistry::new();
    switchyard_middleware::register_all(&mut registry, &config, resources).unwrap();

    let table = DispatchTable::build(
        &routes::tree(&config.app.name),
        &config.routing.default_middlewares,
        config.routing.duplicate_policy,
    )
    .unwrap();
    let router = CompiledRouter::build(&table, &registry, &config).unwrap();
    let app = build_app(AppState {
        router: Arc::new(router),
        body_limit: config.server.body_limit_bytes,
    });
    TestApp { app, store }
}

fn make_app() -> TestApp {
    make_app_with(SwitchyardConfig::default())
}

fn req(method: Method, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("host", "switchyard.test")
        .header("x-forwarded-for", "198.51.100.20")
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ── Dispatch ──────────────────────────────────────────────────

#[tokio::test]
async fn health_is_served_and_not_logged() {
    let t = make_app();
    let resp = t
        .app
        .oneshot(req(Method::GET, "/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    assert_eq!(body_json(resp).await["status"], "ok");
    assert!(t.store.access_records().is_empty());
}

#[tokio::test]
async fn method_group_selects_member_by_method() {
    let t = make_app();
    let resp = t
        .app
        .clone()
        .oneshot(req(Method::GET, "/api/items/7").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({"id": "7"}));

    let resp = t
        .app
        .oneshot(req(Method::DELETE, "/api/items/7/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["deleted"], true);
}

#[tokio::test]
async fn unregistered_method_is_404_with_code() {
    let t = make_app();
    let resp = t
        .app
        .oneshot(req(Method::PUT, "/api/items/7").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.headers()[ERROR_CODE_HEADER], "0405");
    assert_eq!(body_json(resp).await["message"], "Method not allowed");
}

#[tokio::test]
async fn configured_405_lists_allowed_methods() {
    let mut config = SwitchyardConfig::default();
    config.routing.method_mismatch_status = 405;
    let t = make_app_with(config);
    let resp = t
        .app
        .oneshot(req(Method::PATCH, "/api/items/7").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(resp.headers()["allow"], "GET, DELETE");
}

#[tokio::test]
async fn unknown_path_is_route_not_found() {
    let t = make_app();
    let resp = t
        .app
        .oneshot(req(Method::GET, "/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.headers()[ERROR_CODE_HEADER], "0405");
    let j = body_json(resp).await;
    assert_eq!(j["success"], false);
    assert_eq!(j["message"], "Route not found");
    assert_eq!(j["status_code"], 404);
}

#[tokio::test]
async fn preflight_is_answered_for_a_method_group() {
    let t = make_app();
    let resp = t
        .app
        .oneshot(
            req(Method::OPTIONS, "/api/items/7")
                .header("origin", "https://ui.example.com")
                .header("access-control-request-method", "DELETE")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(resp.headers().contains_key("access-control-allow-methods"));
}

// ── Access log ────────────────────────────────────────────────

#[tokio::test]
async fn echo_is_logged_with_redacted_body() {
    let t = make_app();
    let resp = t
        .app
        .oneshot(
            req(Method::POST, "/api/echo")
                .header("content-type", "application/json")
                .header("x-request-id", "trace-42")
                .body(Body::from(r#"{"password":"x","email":"a@b.com"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-request-id"], "trace-42");
    let j = body_json(resp).await;
    assert_eq!(j["request_id"], "trace-42");
    assert_eq!(j["body"]["password"], "x");

    let records = t.store.access_records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.request_id, "trace-42");
    assert_eq!(record.ip, "198.51.100.20");
    assert_eq!(record.path, "http://switchyard.test/api/echo");
    assert_eq!(record.response_code, 200);
    assert_eq!(record.body["password"], "*******");
    assert_eq!(record.body["email"], "a@******");
}

#[tokio::test]
async fn peer_address_reaches_the_guard() {
    let t = make_app();
    let peer: SocketAddr = "192.0.2.44:51000".parse().unwrap();
    let mut request = Request::builder()
        .method(Method::GET)
        .uri("/api/items/1")
        .body(Body::empty())
        .unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));
    t.app.oneshot(request).await.unwrap();
    assert_eq!(t.store.access_records()[0].ip, "192.0.2.44");
}

#[tokio::test]
async fn oversized_body_is_413() {
    let mut config = SwitchyardConfig::default();
    config.server.body_limit_bytes = 16;
    let t = make_app_with(config);
    let resp = t
        .app
        .oneshot(
            req(Method::POST, "/api/echo")
                .body(Body::from(vec![b'a'; 64]))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(t.store.access_records().is_empty());
}

// ── Auth ──────────────────────────────────────────────────────

#[tokio::test]
async fn missing_authorization_is_401_and_logged_as_401() {
    let t = make_app();
    let resp = t
        .app
        .oneshot(req(Method::GET, "/api/me").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers()[ERROR_CODE_HEADER], "0401");

    let records = t.store.access_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].response_code, 401);
    assert!(records.iter().all(|r| r.response_code != 200));
}

#[tokio::test]
async fn valid_token_returns_decision_with_header_scrubbed_in_log() {
    let t = make_app();
    let resp = t
        .app
        .oneshot(
            req(Method::GET, "/api/me")
                .header("authorization", "Bearer letmein")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["user"], "ann");

    let record = &t.store.access_records()[0];
    assert_eq!(record.response_code, 200);
    assert_eq!(record.header["authorization"], ["[REDACTED]"]);
}

#[tokio::test]
async fn repeated_unauthorized_requests_get_blacklisted() {
    let t = make_app();
    for _ in 0..10 {
        let resp = t
            .app
            .clone()
            .oneshot(req(Method::GET, "/api/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    let resp = t
        .app
        .clone()
        .oneshot(req(Method::GET, "/api/me").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let entries = t.store.blacklist_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].ip, "198.51.100.20");

    // Even a public route is refused while the block lasts.
    let resp = t
        .app
        .oneshot(req(Method::GET, "/api/items/1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(resp.headers()[ERROR_CODE_HEADER], "0404");
}
