use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_MAX_AGE, ORIGIN,
    VARY,
};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use std::sync::Arc;
use switchyard_core::config::CorsConfig;
use switchyard_core::{
    BoxFuture, ErrorCode, Handler, MiddlewareKey, Request, Response, RouteEntry, SwitchyardError,
    response,
};
use switchyard_pipeline::Middleware;
use tracing::debug;

pub struct CorsMiddleware {
    policy: Arc<CorsPolicy>,
}

struct CorsPolicy {
    any_origin: bool,
    origins: Vec<String>,
    allow_credentials: bool,
    allow_methods: HeaderValue,
    allow_headers: HeaderValue,
    expose_headers: Option<HeaderValue>,
    max_age: Option<HeaderValue>,
}

fn header_list(field: &str, values: &[String]) -> Result<HeaderValue, SwitchyardError> {
    HeaderValue::from_str(&values.join(", "))
        .map_err(|e| SwitchyardError::Config(format!("cors.{field}: {e}")))
}

impl CorsPolicy {
    fn from_config(config: &CorsConfig) -> Result<Self, SwitchyardError> {
        let any_origin = config.allow_origins.iter().any(|o| o == "*");
        let expose_headers = if config.expose_headers.is_empty() {
            None
        } else {
            Some(header_list("expose_headers", &config.expose_headers)?)
        };
        let max_age = (config.max_age_secs > 0).then(|| HeaderValue::from(config.max_age_secs));

        Ok(Self {
            any_origin,
            origins: config.allow_origins.clone(),
            allow_credentials: config.allow_credentials,
            allow_methods: header_list("allow_methods", &config.allow_methods)?,
            allow_headers: header_list("allow_headers", &config.allow_headers)?,
            expose_headers,
            max_age,
        })
    }

    /// `Access-Control-Allow-Origin` for a request, or `None` when the
    /// origin is not allowed. A request without `Origin` is not a CORS
    /// request and is only decorated under a wildcard policy.
    fn allow_origin(&self, origin: Option<&str>) -> Result<Option<HeaderValue>, ()> {
        match origin {
            None if self.any_origin => Ok(Some(HeaderValue::from_static("*"))),
            None => Ok(None),
            Some(origin) => {
                let listed = self.origins.iter().any(|o| o == origin);
                if !self.any_origin && !listed {
                    return Err(());
                }
                if self.any_origin && !self.allow_credentials {
                    return Ok(Some(HeaderValue::from_static("*")));
                }
                Ok(HeaderValue::from_str(origin).ok())
            }
        }
    }

    fn decorate(&self, headers: &mut HeaderMap, origin: Option<HeaderValue>) {
        if let Some(origin) = origin {
            if origin != "*" {
                headers.append(VARY, HeaderValue::from_static("Origin"));
            }
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        }
        if self.allow_credentials {
            headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
        if let Some(expose) = &self.expose_headers {
            headers.insert(ACCESS_CONTROL_EXPOSE_HEADERS, expose.clone());
        }
    }

    fn preflight(&self, origin: Option<HeaderValue>) -> Response {
        let mut resp = response::empty(StatusCode::NO_CONTENT);
        let headers = resp.headers_mut();
        self.decorate(headers, origin);
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers.clone());
        if let Some(max_age) = &self.max_age {
            headers.insert(ACCESS_CONTROL_MAX_AGE, max_age.clone());
        }
        resp
    }
}

impl CorsMiddleware {
    pub const KEY: MiddlewareKey = MiddlewareKey::new("cors");

    pub fn new(config: &CorsConfig) -> Result<Self, SwitchyardError> {
        Ok(Self {
            policy: Arc::new(CorsPolicy::from_config(config)?),
        })
    }
}

impl Middleware for CorsMiddleware {
    fn key(&self) -> MiddlewareKey {
        Self::KEY
    }

    fn wrap(&self, next: Handler, _route: &RouteEntry) -> Handler {
        let policy = Arc::clone(&self.policy);
        Arc::new(move |req: Request| -> BoxFuture<'static, Response> {
            let origin = req.headers().get(ORIGIN).and_then(|v| v.to_str().ok());

            let allow_origin = match policy.allow_origin(origin) {
                Ok(value) => value,
                Err(()) => {
                    debug!(origin = origin.unwrap_or_default(), "CORS origin rejected");
                    let resp = response::rejection(
                        StatusCode::FORBIDDEN,
                        ErrorCode::Forbidden,
                        "Origin not allowed",
                    );
                    return Box::pin(async move { resp });
                }
            };

            if *req.method() == Method::OPTIONS {
                let resp = policy.preflight(allow_origin);
                return Box::pin(async move { resp });
            }

            let fut = next(req);
            let policy = Arc::clone(&policy);
            Box::pin(async move {
                let mut resp = fut.await;
                policy.decorate(resp.headers_mut(), allow_origin);
                resp
            })
        })
    }
}
