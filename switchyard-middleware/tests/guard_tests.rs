use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration as TimeDelta, Utc};
use http::{Method, StatusCode};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::time::Duration;
use switchyard_core::context::{ClientAddr, CorrelationId};
use switchyard_core::error::ERROR_CODE_HEADER;
use switchyard_core::{Handler, Request, RouteEntry, SwitchyardConfig, handler, response};
use switchyard_middleware::AccessGuard;
use switchyard_pipeline::Middleware;
use switchyard_store::{AccessLogRecord, AccessStore, BlacklistEntry, MemoryStore, StoreError};
use uuid::Uuid;

// ── Helpers ───────────────────────────────────────────────────

/// Downstream action answering with a settable status and counting calls.
#[derive(Clone)]
struct Downstream {
    status: Arc<AtomicU16>,
    calls: Arc<AtomicUsize>,
}

impl Downstream {
    fn new(status: StatusCode) -> Self {
        Self {
            status: Arc::new(AtomicU16::new(status.as_u16())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn handler(&self) -> Handler {
        let this = self.clone();
        handler(move |_req: Request| {
            let this = this.clone();
            async move {
                this.calls.fetch_add(1, Ordering::SeqCst);
                let status = StatusCode::from_u16(this.status.load(Ordering::SeqCst)).unwrap();
                response::text(status, "downstream")
            }
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn guarded(store: Arc<dyn AccessStore>, config: &SwitchyardConfig, downstream: &Downstream) -> Handler {
    let action = downstream.handler();
    let route = RouteEntry::post("/login", action.clone());
    AccessGuard::new(config, store).unwrap().wrap(action, &route)
}

fn request_from(ip: &'static str) -> Request {
    http::Request::builder()
        .method(Method::POST)
        .uri("/login")
        .header("host", "api.example.com")
        .header("x-forwarded-for", ip)
        .header("authorization", "Bearer secret")
        .header("content-type", "application/json")
        .body(Bytes::from_static(br#"{"password":"x","email":"a@b.com"}"#))
        .unwrap()
}

fn seeded(ip: &str, code: u16, created_at: DateTime<Utc>) -> AccessLogRecord {
    AccessLogRecord {
        id: Uuid::now_v7(),
        app: "sbframework".into(),
        ip: ip.into(),
        real_ip: ip.into(),
        method: "POST".into(),
        path: "http://api.example.com/login".into(),
        response_code: code,
        body: Value::Null,
        header: Default::default(),
        request_id: Uuid::now_v7().to_string(),
        created_at,
        updated_at: created_at,
    }
}

async fn seed(store: &MemoryStore, ip: &str, code: u16, n: usize) {
    for _ in 0..n {
        store.insert_access(seeded(ip, code, Utc::now())).await.unwrap();
    }
}

// ── Admission and logging ─────────────────────────────────────

#[tokio::test]
async fn fresh_ip_is_logged_and_admitted() {
    let store = MemoryStore::new();
    let downstream = Downstream::new(StatusCode::OK);
    let guard = guarded(Arc::new(store.clone()), &SwitchyardConfig::default(), &downstream);

    let resp = guard(request_from("198.51.100.7")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(downstream.calls(), 1);

    let records = store.access_records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.app, "sbframework");
    assert_eq!(record.ip, "198.51.100.7");
    assert_eq!(record.method, "POST");
    assert_eq!(record.path, "http://api.example.com/login");
    assert_eq!(record.response_code, 200);
    assert_eq!(record.body["password"], "*******");
    assert_eq!(record.body["email"], "a@******");
    assert_eq!(record.header["authorization"], ["[REDACTED]"]);
    assert_eq!(record.header["content-type"], ["application/json"]);
    assert!(store.blacklist_entries().is_empty());
}

#[tokio::test]
async fn downstream_status_corrects_the_record() {
    let store = MemoryStore::new();
    let downstream = Downstream::new(StatusCode::NOT_FOUND);
    let guard = guarded(Arc::new(store.clone()), &SwitchyardConfig::default(), &downstream);

    let resp = guard(request_from("198.51.100.8")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let records = store.access_records();
    assert_eq!(records[0].response_code, 404);
    assert!(records[0].updated_at >= records[0].created_at);
}

#[tokio::test]
async fn correlation_id_is_assigned_when_missing() {
    let store = MemoryStore::new();
    let config = SwitchyardConfig::default();
    let action = handler(|req: Request| async move {
        let id = req.extensions().get::<CorrelationId>().cloned().unwrap();
        response::text(StatusCode::OK, id.0)
    });
    let route = RouteEntry::post("/login", action.clone());
    let guard = AccessGuard::new(&config, Arc::new(store.clone())).unwrap().wrap(action, &route);

    let resp = guard(request_from("198.51.100.9")).await;
    let seen = String::from_utf8(resp.body().to_vec()).unwrap();
    assert!(!seen.is_empty());
    assert_eq!(store.access_records()[0].request_id, seen);
}

#[tokio::test]
async fn inbound_correlation_header_is_logged() {
    let store = MemoryStore::new();
    let downstream = Downstream::new(StatusCode::OK);
    let guard = guarded(Arc::new(store.clone()), &SwitchyardConfig::default(), &downstream);

    let mut req = request_from("198.51.100.10");
    req.headers_mut().insert("x-request-id", "req-abc".parse().unwrap());
    guard(req).await;
    assert_eq!(store.access_records()[0].request_id, "req-abc");
}

#[tokio::test]
async fn peer_address_used_without_forwarding_header() {
    let store = MemoryStore::new();
    let downstream = Downstream::new(StatusCode::OK);
    let guard = guarded(Arc::new(store.clone()), &SwitchyardConfig::default(), &downstream);

    let mut req = http::Request::builder().uri("/login").body(Bytes::new()).unwrap();
    let peer: SocketAddr = "192.0.2.1:40000".parse().unwrap();
    req.extensions_mut().insert(ClientAddr(peer));
    guard(req).await;

    let record = &store.access_records()[0];
    assert_eq!(record.ip, "192.0.2.1");
    assert_eq!(record.real_ip, "192.0.2.1:40000");
    assert!(record.body.is_null());
}

// ── Blacklist ─────────────────────────────────────────────────

#[tokio::test]
async fn active_block_rejects_without_logging() {
    let store = MemoryStore::new();
    store
        .insert_blacklist(BlacklistEntry {
            ip: "203.0.113.5".into(),
            reason: "manual".into(),
            created_at: Utc::now(),
            expired_at: None,
        })
        .await
        .unwrap();
    let downstream = Downstream::new(StatusCode::OK);
    let guard = guarded(Arc::new(store.clone()), &SwitchyardConfig::default(), &downstream);

    let resp = guard(request_from("203.0.113.5")).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(resp.headers()[ERROR_CODE_HEADER], "0404");
    assert_eq!(downstream.calls(), 0);
    assert!(store.access_records().is_empty());
}

#[tokio::test]
async fn expired_block_does_not_reject() {
    let store = MemoryStore::new();
    store
        .insert_blacklist(BlacklistEntry {
            ip: "203.0.113.6".into(),
            reason: "exceeded 401 threshold".into(),
            created_at: Utc::now() - TimeDelta::days(2),
            expired_at: Some(Utc::now() - TimeDelta::days(1)),
        })
        .await
        .unwrap();
    let downstream = Downstream::new(StatusCode::OK);
    let guard = guarded(Arc::new(store.clone()), &SwitchyardConfig::default(), &downstream);

    let resp = guard(request_from("203.0.113.6")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(downstream.calls(), 1);
}

// ── Escalation ────────────────────────────────────────────────

#[tokio::test]
async fn repeated_forbidden_responses_block_permanently() {
    let store = MemoryStore::new();
    seed(&store, "203.0.113.7", 403, 4).await;
    let downstream = Downstream::new(StatusCode::OK);
    let guard = guarded(Arc::new(store.clone()), &SwitchyardConfig::default(), &downstream);

    let resp = guard(request_from("203.0.113.7")).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(resp.headers()[ERROR_CODE_HEADER], "0403");
    assert_eq!(downstream.calls(), 0);

    let entries = store.blacklist_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].reason, "exceeded 403 threshold");
    assert!(entries[0].expired_at.is_none());

    let last = store.access_records().pop().unwrap();
    assert_eq!(last.response_code, 403);

    let again = guard(request_from("203.0.113.7")).await;
    assert_eq!(again.headers()[ERROR_CODE_HEADER], "0404");
}

#[tokio::test]
async fn forbidden_responses_outside_the_window_are_ignored() {
    let store = MemoryStore::new();
    for _ in 0..5 {
        store
            .insert_access(seeded("203.0.113.8", 403, Utc::now() - TimeDelta::minutes(30)))
            .await
            .unwrap();
    }
    let downstream = Downstream::new(StatusCode::OK);
    let guard = guarded(Arc::new(store.clone()), &SwitchyardConfig::default(), &downstream);

    assert_eq!(guard(request_from("203.0.113.8")).await.status(), StatusCode::OK);
    assert!(store.blacklist_entries().is_empty());
}

#[tokio::test]
async fn eleventh_unauthorized_request_is_blocked_for_a_day() {
    let store = MemoryStore::new();
    let downstream = Downstream::new(StatusCode::UNAUTHORIZED);
    let guard = guarded(Arc::new(store.clone()), &SwitchyardConfig::default(), &downstream);

    for _ in 0..10 {
        let resp = guard(request_from("203.0.113.9")).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(resp.headers().get(ERROR_CODE_HEADER).is_none());
    }
    assert_eq!(downstream.calls(), 10);
    assert!(store.blacklist_entries().is_empty());

    let before = Utc::now();
    let resp = guard(request_from("203.0.113.9")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers()[ERROR_CODE_HEADER], "0401");
    assert_eq!(downstream.calls(), 10);

    let entries = store.blacklist_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].reason, "exceeded 401 threshold");
    let expiry = entries[0].expired_at.unwrap();
    assert!(expiry >= before + TimeDelta::hours(24));
    assert!(expiry <= Utc::now() + TimeDelta::hours(24));
}

#[tokio::test]
async fn one_forbidden_short_of_the_threshold_is_admitted() {
    let config = SwitchyardConfig::default();
    let store = MemoryStore::new();
    seed(&store, "203.0.113.20", 403, config.access.max_denied as usize - 1).await;
    let downstream = Downstream::new(StatusCode::OK);
    let guard = guarded(Arc::new(store.clone()), &config, &downstream);

    assert_eq!(guard(request_from("203.0.113.20")).await.status(), StatusCode::OK);
    assert_eq!(downstream.calls(), 1);
    assert!(store.blacklist_entries().is_empty());
}

#[tokio::test]
async fn exactly_max_denied_forbidden_responses_block() {
    let config = SwitchyardConfig::default();
    let store = MemoryStore::new();
    seed(&store, "203.0.113.21", 403, config.access.max_denied as usize).await;
    let downstream = Downstream::new(StatusCode::OK);
    let guard = guarded(Arc::new(store.clone()), &config, &downstream);

    let resp = guard(request_from("203.0.113.21")).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(resp.headers()[ERROR_CODE_HEADER], "0403");
    assert_eq!(downstream.calls(), 0);
    assert_eq!(store.blacklist_entries().len(), 1);
}

#[tokio::test]
async fn one_unauthorized_short_of_the_threshold_is_admitted() {
    let config = SwitchyardConfig::default();
    let store = MemoryStore::new();
    seed(&store, "203.0.113.22", 401, config.access.max_unauthorized as usize - 1).await;
    let downstream = Downstream::new(StatusCode::OK);
    let guard = guarded(Arc::new(store.clone()), &config, &downstream);

    assert_eq!(guard(request_from("203.0.113.22")).await.status(), StatusCode::OK);
    assert!(store.blacklist_entries().is_empty());
}

#[tokio::test]
async fn exactly_max_unauthorized_responses_block() {
    let config = SwitchyardConfig::default();
    let store = MemoryStore::new();
    seed(&store, "203.0.113.23", 401, config.access.max_unauthorized as usize).await;
    let downstream = Downstream::new(StatusCode::OK);
    let guard = guarded(Arc::new(store.clone()), &config, &downstream);

    let resp = guard(request_from("203.0.113.23")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers()[ERROR_CODE_HEADER], "0401");
    assert_eq!(downstream.calls(), 0);
    let entries = store.blacklist_entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].expired_at.is_some());
}

#[tokio::test]
async fn counts_are_per_ip() {
    let store = MemoryStore::new();
    seed(&store, "203.0.113.10", 403, 4).await;
    let downstream = Downstream::new(StatusCode::OK);
    let guard = guarded(Arc::new(store.clone()), &SwitchyardConfig::default(), &downstream);

    assert_eq!(guard(request_from("203.0.113.11")).await.status(), StatusCode::OK);
}

// ── Store failures ────────────────────────────────────────────

struct BrokenStore {
    delay: Option<Duration>,
}

#[async_trait]
impl AccessStore for BrokenStore {
    async fn find_active_block(
        &self,
        _ip: &str,
        _now: DateTime<Utc>,
    ) -> Result<Option<BlacklistEntry>, StoreError> {
        match self.delay {
            Some(delay) => {
                tokio::time::sleep(delay).await;
                Ok(None)
            }
            None => Err(StoreError::Unavailable("connection reset".into())),
        }
    }

    async fn count_responses(&self, _: &str, _: u16, _: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(0)
    }

    async fn insert_access(&self, _: AccessLogRecord) -> Result<(), StoreError> {
        Ok(())
    }

    async fn update_response_code(&self, _: Uuid, _: u16, _: DateTime<Utc>) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_blacklist(&self, _: BlacklistEntry) -> Result<(), StoreError> {
        Ok(())
    }
}

#[tokio::test]
async fn store_error_is_500_and_stops_the_request() {
    let downstream = Downstream::new(StatusCode::OK);
    let guard = guarded(
        Arc::new(BrokenStore { delay: None }),
        &SwitchyardConfig::default(),
        &downstream,
    );

    let resp = guard(request_from("203.0.113.12")).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.headers()[ERROR_CODE_HEADER], "0500");
    assert_eq!(downstream.calls(), 0);
}

#[tokio::test]
async fn slow_store_times_out() {
    let mut config = SwitchyardConfig::default();
    config.store.timeout_ms = 20;
    let downstream = Downstream::new(StatusCode::OK);
    let guard = guarded(
        Arc::new(BrokenStore { delay: Some(Duration::from_secs(5)) }),
        &config,
        &downstream,
    );

    let resp = guard(request_from("203.0.113.13")).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(downstream.calls(), 0);
}
