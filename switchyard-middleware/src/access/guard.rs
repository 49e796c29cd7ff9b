use super::client_ip::{self, ClientIp};
use super::url;
use crate::correlation;
use chrono::{DateTime, TimeDelta, Utc};
use http::{HeaderName, StatusCode};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use switchyard_core::context::{ClientAddr, CorrelationId};
use switchyard_core::{
    BoxFuture, ErrorCode, Handler, MiddlewareKey, Request, Response, RouteEntry, SwitchyardConfig,
    SwitchyardError, response,
};
use switchyard_observability::redact::{self, BodyRedactor};
use switchyard_pipeline::Middleware;
use switchyard_store::{AccessLogRecord, AccessStore, BlacklistEntry, StoreError};
use tracing::{error, warn};
use uuid::Uuid;

/// Blacklist lookup plus sliding-window escalation, with an access-log
/// record for every admitted request.
///
/// Per request:
/// 1. an active blacklist entry for the client IP answers 403 (`0404`);
/// 2. enough 403s in the window add a permanent entry and answer 403 (`0403`);
/// 3. enough 401s in the window add a temporary entry and answer 401 (`0401`);
/// 4. otherwise the request is logged as 200, passed on, and the record is
///    corrected when the downstream status differs.
///
/// Every store call is bounded by the store timeout. A failing or slow store
/// answers 500 (`0500`) and the request goes no further.
#[derive(Clone)]
pub struct AccessGuard {
    inner: Arc<Guard>,
}

struct Guard {
    store: Arc<dyn AccessStore>,
    app: String,
    max_denied: u64,
    max_unauthorized: u64,
    window: TimeDelta,
    unauthorized_block: TimeDelta,
    timeout: Duration,
    redactor: BodyRedactor,
    correlation_header: HeaderName,
}

enum Escalation {
    Denied(u64),
    Unauthorized(u64),
}

fn delta(field: &str, d: Duration) -> Result<TimeDelta, SwitchyardError> {
    TimeDelta::from_std(d).map_err(|e| SwitchyardError::Config(format!("access.{field}: {e}")))
}

fn store_failure() -> Response {
    response::rejection(
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorCode::Internal,
        "Internal server error",
    )
}

fn access_denied(status: StatusCode, code: ErrorCode) -> Response {
    response::rejection(status, code, "Access denied")
}

impl AccessGuard {
    pub const KEY: MiddlewareKey = MiddlewareKey::new("access");

    pub fn new(config: &SwitchyardConfig, store: Arc<dyn AccessStore>) -> Result<Self, SwitchyardError> {
        let access = &config.access;
        let correlation_header = HeaderName::from_bytes(config.correlation.header.trim().as_bytes())
            .map_err(|e| SwitchyardError::Config(format!("correlation.header: {e}")))?;

        Ok(Self {
            inner: Arc::new(Guard {
                store,
                app: config.app.name.clone(),
                max_denied: access.max_denied,
                max_unauthorized: access.max_unauthorized,
                window: delta("window_secs", access.window())?,
                unauthorized_block: delta("unauthorized_block_secs", access.unauthorized_block())?,
                timeout: config.store.timeout(),
                redactor: BodyRedactor::new(&access.redact_fields),
                correlation_header,
            }),
        })
    }
}

impl Middleware for AccessGuard {
    fn key(&self) -> MiddlewareKey {
        Self::KEY
    }

    fn wrap(&self, next: Handler, _route: &RouteEntry) -> Handler {
        let guard = Arc::clone(&self.inner);
        Arc::new(move |req: Request| -> BoxFuture<'static, Response> {
            let guard = Arc::clone(&guard);
            let next = Arc::clone(&next);
            Box::pin(async move { guard.handle(req, next).await })
        })
    }
}

impl Guard {
    async fn handle(&self, mut req: Request, next: Handler) -> Response {
        let peer = req.extensions().get::<ClientAddr>().map(|c| c.0);
        let client = client_ip::extract(req.headers(), peer);
        let correlation = correlation::assign(&mut req, &self.correlation_header);
        let now = Utc::now();

        match self
            .bounded("find_active_block", &client.ip, self.store.find_active_block(&client.ip, now))
            .await
        {
            Err(resp) => return resp,
            Ok(Some(entry)) => {
                warn!(ip = %client.ip, reason = %entry.reason, "request from blacklisted ip");
                return access_denied(StatusCode::FORBIDDEN, ErrorCode::Blacklisted);
            }
            Ok(None) => {}
        }

        let since = now - self.window;
        let denied = match self
            .bounded("count_responses", &client.ip, self.store.count_responses(&client.ip, 403, since))
            .await
        {
            Ok(n) => n,
            Err(resp) => return resp,
        };
        if denied >= self.max_denied {
            return self
                .escalate(&req, &client, &correlation, now, Escalation::Denied(denied))
                .await;
        }

        let unauthorized = match self
            .bounded("count_responses", &client.ip, self.store.count_responses(&client.ip, 401, since))
            .await
        {
            Ok(n) => n,
            Err(resp) => return resp,
        };
        if unauthorized >= self.max_unauthorized {
            return self
                .escalate(&req, &client, &correlation, now, Escalation::Unauthorized(unauthorized))
                .await;
        }

        let record = self.record(&req, &client, &correlation, StatusCode::OK, now);
        let id = record.id;
        if let Err(resp) = self
            .bounded("insert_access", &client.ip, self.store.insert_access(record))
            .await
        {
            return resp;
        }

        let resp = next(req).await;

        let status = resp.status();
        if status != StatusCode::OK {
            // The response already exists; a failed correction is only logged.
            let _ = self
                .bounded(
                    "update_response_code",
                    &client.ip,
                    self.store.update_response_code(id, status.as_u16(), Utc::now()),
                )
                .await;
        }
        resp
    }

    async fn escalate(
        &self,
        req: &Request,
        client: &ClientIp,
        correlation: &CorrelationId,
        now: DateTime<Utc>,
        escalation: Escalation,
    ) -> Response {
        let (reason, expired_at, status, code, count, threshold) = match escalation {
            Escalation::Denied(count) => (
                "exceeded 403 threshold",
                None,
                StatusCode::FORBIDDEN,
                ErrorCode::Forbidden,
                count,
                self.max_denied,
            ),
            Escalation::Unauthorized(count) => (
                "exceeded 401 threshold",
                Some(now + self.unauthorized_block),
                StatusCode::UNAUTHORIZED,
                ErrorCode::Denied,
                count,
                self.max_unauthorized,
            ),
        };
        warn!(ip = %client.ip, reason, count, threshold, ?expired_at, "blacklisting ip");

        let entry = BlacklistEntry {
            ip: client.ip.clone(),
            reason: reason.to_string(),
            created_at: now,
            expired_at,
        };
        if let Err(resp) = self
            .bounded("insert_blacklist", &client.ip, self.store.insert_blacklist(entry))
            .await
        {
            return resp;
        }

        let record = self.record(req, client, correlation, status, now);
        if let Err(resp) = self
            .bounded("insert_access", &client.ip, self.store.insert_access(record))
            .await
        {
            return resp;
        }

        access_denied(status, code)
    }

    fn record(
        &self,
        req: &Request,
        client: &ClientIp,
        correlation: &CorrelationId,
        status: StatusCode,
        now: DateTime<Utc>,
    ) -> AccessLogRecord {
        AccessLogRecord {
            id: Uuid::now_v7(),
            app: self.app.clone(),
            ip: client.ip.clone(),
            real_ip: client.real_ip.clone(),
            method: req.method().to_string(),
            path: url::full_url(req),
            response_code: status.as_u16(),
            body: self.redactor.redact(req.body()),
            header: redact::scrub_headers(req.headers()),
            request_id: correlation.0.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Run one store operation under the store timeout.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        ip: &str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, Response> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!(ip, operation, error = %e, "access store failure");
                Err(store_failure())
            }
            Err(_) => {
                error!(ip, operation, timeout_ms = self.timeout.as_millis() as u64, "access store timed out");
                Err(store_failure())
            }
        }
    }
}
