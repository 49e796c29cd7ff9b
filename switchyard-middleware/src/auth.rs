//! Delegated authentication.
//!
//! Routes declaring a [`RouteAuth`] requirement forward the caller's
//! `Authorization` header to the account service, which answers with a
//! decision document. Routes without a requirement compile without any
//! wrapper at all.

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderValue, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use switchyard_core::config::AuthConfig;
use switchyard_core::context::AuthDecision;
use switchyard_core::{
    BoxFuture, ErrorCode, Handler, MiddlewareKey, Request, Response, RouteAuth, RouteEntry,
    SwitchyardError, response,
};
use switchyard_pipeline::Middleware;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The service answered, and the answer was no.
    #[error("account service rejected the token with {status}")]
    Rejected {
        status: StatusCode,
        content_type: Option<HeaderValue>,
        body: Bytes,
    },

    #[error("account service unreachable: {0}")]
    Transport(String),

    #[error("account service returned an unreadable decision: {0}")]
    InvalidResponse(String),
}

/// Something that can judge a bearer token against a route's requirement.
#[async_trait]
pub trait AuthValidator: Send + Sync {
    async fn validate(&self, token: &str, auth: &RouteAuth) -> Result<Value, AuthError>;
}

#[derive(Serialize)]
struct ValidationRequest<'a> {
    token: &'a str,
    app: &'a str,
    permission: &'a str,
}

/// HTTP client for the account service's validation endpoint.
pub struct AccountService {
    client: reqwest::Client,
    url: String,
}

impl AccountService {
    pub fn new(config: &AuthConfig) -> Result<Self, SwitchyardError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| SwitchyardError::Config(format!("auth client: {e}")))?;
        Ok(Self {
            client,
            url: config.validation_url(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AuthValidator for AccountService {
    async fn validate(&self, token: &str, auth: &RouteAuth) -> Result<Value, AuthError> {
        let resp = self
            .client
            .post(&self.url)
            .json(&ValidationRequest {
                token,
                app: &auth.app,
                permission: &auth.permission,
            })
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<Value>()
                .await
                .map_err(|e| AuthError::InvalidResponse(e.to_string()));
        }

        let content_type = resp.headers().get(CONTENT_TYPE).cloned();
        let body = resp.bytes().await.unwrap_or_default();
        Err(AuthError::Rejected {
            status,
            content_type,
            body,
        })
    }
}

pub struct AuthMiddleware {
    validator: Arc<dyn AuthValidator>,
}

impl AuthMiddleware {
    pub const KEY: MiddlewareKey = MiddlewareKey::new("auth");

    pub fn new(validator: Arc<dyn AuthValidator>) -> Self {
        Self { validator }
    }
}

fn unauthorized() -> Response {
    response::rejection(StatusCode::UNAUTHORIZED, ErrorCode::Denied, "Unauthorized")
}

fn bearer(req: &Request) -> Option<String> {
    let raw = req.headers().get(AUTHORIZATION)?.to_str().ok()?.trim();
    (!raw.is_empty()).then(|| raw.to_string())
}

/// Turn a refusal into the caller's response: 4xx statuses and bodies pass
/// through, anything else collapses to a plain 401.
fn refusal(err: AuthError) -> Response {
    match err {
        AuthError::Rejected {
            status,
            content_type,
            body,
        } if status.is_client_error() => {
            if body.is_empty() {
                return response::rejection(status, code_for(status), "Unauthorized");
            }
            let mut resp = Response::new(body);
            *resp.status_mut() = status;
            if let Some(ct) = content_type {
                resp.headers_mut().insert(CONTENT_TYPE, ct);
            }
            response::with_code(resp, code_for(status))
        }
        _ => unauthorized(),
    }
}

fn code_for(status: StatusCode) -> ErrorCode {
    if status == StatusCode::FORBIDDEN {
        ErrorCode::Forbidden
    } else {
        ErrorCode::Denied
    }
}

impl Middleware for AuthMiddleware {
    fn key(&self) -> MiddlewareKey {
        Self::KEY
    }

    fn wrap(&self, next: Handler, route: &RouteEntry) -> Handler {
        let Some(auth) = route.auth.clone() else {
            return next;
        };
        let auth = Arc::new(auth);
        let validator = Arc::clone(&self.validator);

        Arc::new(move |mut req: Request| -> BoxFuture<'static, Response> {
            let Some(token) = bearer(&req) else {
                debug!(app = %auth.app, "missing authorization header");
                return Box::pin(async { unauthorized() });
            };
            let validator = Arc::clone(&validator);
            let auth = Arc::clone(&auth);
            let next = Arc::clone(&next);

            Box::pin(async move {
                match validator.validate(&token, &auth).await {
                    Ok(decision) => {
                        req.extensions_mut().insert(AuthDecision(decision));
                        next(req).await
                    }
                    Err(err) => {
                        warn!(
                            app = %auth.app,
                            permission = %auth.permission,
                            error = %err,
                            "authentication refused"
                        );
                        refusal(err)
                    }
                }
            })
        })
    }
}
