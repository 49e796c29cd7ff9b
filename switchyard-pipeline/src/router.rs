use crate::compile::{MethodMismatch, compile_dispatch};
use crate::registry::MiddlewareRegistry;
use http::StatusCode;
use std::collections::HashMap;
use std::sync::Arc;
use switchyard_core::context::PathParams;
use switchyard_core::table::DispatchTable;
use switchyard_core::{BoxFuture, ErrorCode, Handler, Request, Response, SwitchyardConfig, SwitchyardError, handler, response};
use tracing::{debug, info};

/// Path → compiled handler lookup handed to the transport.
///
/// Every handler is compiled in [`CompiledRouter::build`]; requests only look
/// one up and call it.
pub struct CompiledRouter {
    matcher: matchit::Router<usize>,
    handlers: Vec<Handler>,
    not_found: Handler,
}

impl CompiledRouter {
    pub fn build(
        table: &DispatchTable,
        registry: &MiddlewareRegistry,
        config: &SwitchyardConfig,
    ) -> Result<Self, SwitchyardError> {
        let mismatch = MethodMismatch::from_config(&config.routing);
        let mut matcher = matchit::Router::new();
        let mut handlers = Vec::with_capacity(table.len());

        for (path, dispatch) in table.iter() {
            let compiled = compile_dispatch(dispatch, registry, mismatch)?;
            matcher
                .insert(path, handlers.len())
                .map_err(|e| SwitchyardError::InvalidRoute {
                    path: path.to_string(),
                    reason: e.to_string(),
                })?;
            handlers.push(compiled);
            for route in dispatch.routes() {
                debug!(
                    method = %route.entry.method,
                    path = %path,
                    middlewares = route.middlewares.len(),
                    "Route compiled"
                );
            }
        }

        if config.app.debug {
            info!("Routes loaded:{}", table.describe(config.app.debug_middlewares));
        }
        info!(paths = handlers.len(), "Router compiled");

        Ok(Self {
            matcher,
            handlers,
            not_found: default_not_found(),
        })
    }

    /// Replace the handler for paths no route matches.
    pub fn with_not_found(mut self, not_found: Handler) -> Self {
        self.not_found = not_found;
        self
    }

    pub fn route_count(&self) -> usize {
        self.handlers.len()
    }

    /// Resolve the request path and run its compiled handler.
    pub fn dispatch(&self, mut req: Request) -> BoxFuture<'static, Response> {
        let path = trim_trailing_slash(req.uri().path()).to_string();
        match self.matcher.at(&path) {
            Ok(matched) => {
                let params: HashMap<String, String> = matched
                    .params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                let handler = Arc::clone(&self.handlers[*matched.value]);
                req.extensions_mut().insert(PathParams(params));
                handler(req)
            }
            Err(_) => {
                debug!(path = %path, "No route matched");
                (self.not_found)(req)
            }
        }
    }
}

fn trim_trailing_slash(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

fn default_not_found() -> Handler {
    handler(|_req| async {
        response::rejection(StatusCode::NOT_FOUND, ErrorCode::NotFound, "Route not found")
    })
}
