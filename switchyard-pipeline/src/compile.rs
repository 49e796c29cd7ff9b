use crate::registry::MiddlewareRegistry;
use http::StatusCode;
use http::header::{ALLOW, HeaderValue};
use std::collections::BTreeMap;
use std::sync::Arc;
use switchyard_core::config::RoutingConfig;
use switchyard_core::response;
use switchyard_core::{
    BoxFuture, Dispatch, ErrorCode, Handler, HttpMethod, Request, ResolvedRoute, Response,
    SwitchyardError,
};

/// Fold a route's middleware around its action, outermost first.
///
/// `middlewares[0]` ends up as the outer wrapper; the last one calls the
/// action directly. Runs once per route at startup.
pub fn compile(
    route: &ResolvedRoute,
    registry: &MiddlewareRegistry,
) -> Result<Handler, SwitchyardError> {
    let mut next = Arc::clone(&route.entry.action);
    for key in route.middlewares.iter().rev() {
        let middleware = registry
            .get(key)
            .ok_or_else(|| SwitchyardError::UnknownMiddleware(key.to_string()))?;
        next = middleware.wrap(next, &route.entry);
    }
    Ok(next)
}

/// Response for a known path requested with a method it does not serve.
#[derive(Debug, Clone, Copy)]
pub struct MethodMismatch {
    status: StatusCode,
}

impl MethodMismatch {
    pub fn new(status: StatusCode) -> Self {
        Self { status }
    }

    pub fn from_config(routing: &RoutingConfig) -> Self {
        let status = StatusCode::from_u16(routing.method_mismatch_status)
            .unwrap_or(StatusCode::NOT_FOUND);
        Self::new(status)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// 405 responses list the served methods in `Allow`.
    pub fn respond(&self, allowed: &[HttpMethod]) -> Response {
        let mut resp = response::rejection(self.status, ErrorCode::NotFound, "Method not allowed");
        if self.status == StatusCode::METHOD_NOT_ALLOWED {
            let list = allowed.iter().map(HttpMethod::as_str).collect::<Vec<_>>().join(", ");
            if let Ok(value) = HeaderValue::from_str(&list) {
                resp.headers_mut().insert(ALLOW, value);
            }
        }
        resp
    }
}

/// Compile everything registered at one path into its top-level handler.
///
/// A method group dispatches on the request method at call time. `OPTIONS`
/// without its own member goes to the first member so a CORS preflight can
/// be answered there.
pub fn compile_dispatch(
    dispatch: &Dispatch,
    registry: &MiddlewareRegistry,
    mismatch: MethodMismatch,
) -> Result<Handler, SwitchyardError> {
    let group = match dispatch {
        Dispatch::Single(route) => return compile(route, registry),
        Dispatch::Methods(group) => group,
    };

    let mut members: BTreeMap<HttpMethod, Handler> = BTreeMap::new();
    for (method, route) in group {
        members.insert(*method, compile(route, registry)?);
    }
    let allowed: Vec<HttpMethod> = members.keys().copied().collect();
    let fallback = members
        .values()
        .next()
        .cloned()
        .ok_or_else(|| SwitchyardError::Internal("empty method group".into()))?;

    Ok(Arc::new(move |req: Request| -> BoxFuture<'static, Response> {
        let selected = match HttpMethod::from_http(req.method()) {
            Some(method) => members.get(&method).cloned().or_else(|| {
                (method == HttpMethod::Options).then(|| Arc::clone(&fallback))
            }),
            None => None,
        };

        match selected {
            Some(handler) => handler(req),
            None => {
                tracing::debug!(method = %req.method(), path = %req.uri().path(), "No route for method");
                let resp = mismatch.respond(&allowed);
                Box::pin(async move { resp })
            }
        }
    }))
}
