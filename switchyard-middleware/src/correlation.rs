use http::{HeaderName, HeaderValue};
use std::sync::Arc;
use std::time::Instant;
use switchyard_core::config::CorrelationConfig;
use switchyard_core::context::CorrelationId;
use switchyard_core::{BoxFuture, Handler, MiddlewareKey, Request, Response, RouteEntry, SwitchyardError};
use switchyard_pipeline::Middleware;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

/// Longest inbound id accepted as-is.
const MAX_INBOUND_LEN: usize = 128;

/// Give the request its correlation id and attach it to the request context.
///
/// A usable inbound header wins; otherwise a UUIDv7 is generated. An id
/// already in the context is returned unchanged, so assigning twice is
/// harmless.
pub fn assign(req: &mut Request, header: &HeaderName) -> CorrelationId {
    if let Some(existing) = req.extensions().get::<CorrelationId>() {
        return existing.clone();
    }

    let inbound = req
        .headers()
        .get(header)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_INBOUND_LEN);

    let id = CorrelationId(match inbound {
        Some(v) => v.to_string(),
        None => Uuid::now_v7().to_string(),
    });
    req.extensions_mut().insert(id.clone());
    id
}

/// Outermost middleware: assigns the id, runs everything downstream inside a
/// `request` span carrying it, and echoes it on the response.
pub struct CorrelationMiddleware {
    header: HeaderName,
}

impl CorrelationMiddleware {
    pub const KEY: MiddlewareKey = MiddlewareKey::new("correlation");

    pub fn new(config: &CorrelationConfig) -> Result<Self, SwitchyardError> {
        let header = HeaderName::from_bytes(config.header.trim().as_bytes()).map_err(|e| {
            SwitchyardError::Config(format!("correlation.header {:?}: {e}", config.header))
        })?;
        Ok(Self { header })
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }
}

impl Middleware for CorrelationMiddleware {
    fn key(&self) -> MiddlewareKey {
        Self::KEY
    }

    fn wrap(&self, next: Handler, _route: &RouteEntry) -> Handler {
        let header = self.header.clone();
        Arc::new(move |mut req: Request| -> BoxFuture<'static, Response> {
            let id = assign(&mut req, &header);
            let span = info_span!(
                "request",
                correlation_id = %id,
                method = %req.method(),
                path = %req.uri().path()
            );
            let started = Instant::now();
            let fut = {
                let _enter = span.enter();
                next(req)
            };
            let header = header.clone();

            Box::pin(
                async move {
                    let mut resp = fut.await;
                    info!(
                        status = resp.status().as_u16(),
                        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
                        "request completed"
                    );
                    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
                        resp.headers_mut().insert(header, value);
                    }
                    resp
                }
                .instrument(span),
            )
        })
    }
}
