//! Route tree served by the `switchyard` binary.

use http::StatusCode;
use http::header::CONTENT_TYPE;
use serde_json::{Value, json};
use switchyard_core::context::{AuthDecision, CorrelationId, PathParams};
use switchyard_core::{Request, Response, RouteEntry, RouteGroup, handler, response};
use switchyard_middleware::{AccessGuard, AuthMiddleware};

pub fn tree(app: &str) -> Vec<RouteGroup> {
    let system = RouteGroup::new("/").route(
        RouteEntry::get("/health", handler(health))
            .exclude(AccessGuard::KEY)
            .exclude(AuthMiddleware::KEY),
    );

    let items = RouteGroup::new("/items")
        .route(RouteEntry::get("/{id}", handler(get_item)))
        .route(RouteEntry::delete("/{id}", handler(delete_item)));

    let api = RouteGroup::new("/api")
        .route(RouteEntry::post("/echo", handler(echo)))
        .route(RouteEntry::get("/me", handler(me)).auth(app, "profile:read"))
        .group(items);

    vec![system, api]
}

async fn health(_req: Request) -> Response {
    response::json(StatusCode::OK, &json!({"status": "ok"}))
}

async fn echo(req: Request) -> Response {
    let correlation = req
        .extensions()
        .get::<CorrelationId>()
        .map(|id| id.as_str().to_string());
    let body: Value = serde_json::from_slice(req.body()).unwrap_or(Value::Null);
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    response::json(
        StatusCode::OK,
        &json!({
            "request_id": correlation,
            "content_type": content_type,
            "body": body,
        }),
    )
}

fn item_id(req: &Request) -> Option<String> {
    req.extensions()
        .get::<PathParams>()
        .and_then(|p| p.get("id"))
        .map(str::to_string)
}

async fn get_item(req: Request) -> Response {
    match item_id(&req) {
        Some(id) => response::json(StatusCode::OK, &json!({"id": id})),
        None => response::error(StatusCode::BAD_REQUEST, "Missing item id", None),
    }
}

async fn delete_item(req: Request) -> Response {
    match item_id(&req) {
        Some(id) => response::json(StatusCode::OK, &json!({"id": id, "deleted": true})),
        None => response::error(StatusCode::BAD_REQUEST, "Missing item id", None),
    }
}

async fn me(req: Request) -> Response {
    match req.extensions().get::<AuthDecision>() {
        Some(AuthDecision(decision)) => response::json(StatusCode::OK, decision),
        None => response::error(StatusCode::UNAUTHORIZED, "Unauthorized", None),
    }
}
