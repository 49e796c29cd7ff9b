use axum::body::{Body, to_bytes};
use axum::extract::{ConnectInfo, Request as AxumRequest, State};
use axum::response::Response as AxumResponse;
use http::StatusCode;
use std::net::SocketAddr;
use std::sync::Arc;
use switchyard_core::context::ClientAddr;
use switchyard_core::response;
use switchyard_pipeline::CompiledRouter;
use tracing::warn;

/// Shared state for the transport adapter.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<CompiledRouter>,
    pub body_limit: usize,
}

/// Every request goes to the compiled router; axum only owns the connection.
pub fn build_app(state: AppState) -> axum::Router {
    axum::Router::new().fallback(dispatch).with_state(state)
}

async fn dispatch(State(state): State<AppState>, req: AxumRequest) -> AxumResponse {
    let (mut parts, body) = req.into_parts();

    let body = match to_bytes(body, state.body_limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, limit = state.body_limit, path = %parts.uri.path(), "Request body rejected");
            let resp = response::error(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large", None);
            return resp.map(Body::from);
        }
    };

    if let Some(ConnectInfo(peer)) = parts.extensions.get::<ConnectInfo<SocketAddr>>().cloned() {
        parts.extensions.insert(ClientAddr(peer));
    }

    let req = http::Request::from_parts(parts, body);
    state.router.dispatch(req).await.map(Body::from)
}
