use std::sync::Arc;
use switchyard_core::config::RoutingConfig;
use switchyard_core::{BoxFuture, Handler, MiddlewareKey, Request, Response, RouteEntry};
use switchyard_pipeline::{Middleware, MethodMismatch};
use tracing::debug;

/// Rejects requests whose method differs from the route's declared one.
pub struct MethodMiddleware {
    mismatch: MethodMismatch,
}

impl MethodMiddleware {
    pub const KEY: MiddlewareKey = MiddlewareKey::new("method");

    pub fn new(routing: &RoutingConfig) -> Self {
        Self {
            mismatch: MethodMismatch::from_config(routing),
        }
    }
}

impl Middleware for MethodMiddleware {
    fn key(&self) -> MiddlewareKey {
        Self::KEY
    }

    fn wrap(&self, next: Handler, route: &RouteEntry) -> Handler {
        let declared = route.method;
        let mismatch = self.mismatch;
        Arc::new(move |req: Request| -> BoxFuture<'static, Response> {
            if declared.matches(req.method()) {
                return next(req);
            }
            debug!(expected = %declared, got = %req.method(), "method mismatch");
            let resp = mismatch.respond(&[declared]);
            Box::pin(async move { resp })
        })
    }
}
