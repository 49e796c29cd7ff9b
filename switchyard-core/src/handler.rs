use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Inbound request. The transport buffers the body before dispatch, so every
/// middleware can inspect it and the terminal action still reads it intact.
pub type Request = http::Request<Bytes>;

pub type Response = http::Response<Bytes>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A compiled request handler: a terminal action, or a middleware wrapped
/// around one. Cloning is a refcount bump.
pub type Handler = Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>;

/// Erase an async function into a [`Handler`].
///
/// ```
/// use switchyard_core::{handler, response};
///
/// let h = handler(|_req| async { response::text(http::StatusCode::OK, "pong") });
/// # let _ = h;
/// ```
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |req| -> BoxFuture<'static, Response> { Box::pin(f(req)) })
}
