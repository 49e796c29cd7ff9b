use switchyard_core::{Handler, MiddlewareKey, RouteEntry};

/// A request-chain participant.
///
/// `wrap` runs once per route when the pipeline is compiled. It receives the
/// next handler and the route's metadata and returns the handler that runs on
/// every request. Shared resources (store, config, HTTP clients) are owned by
/// the implementation and handed over at construction.
pub trait Middleware: Send + Sync {
    /// Stable identity used for inheritance, deduplication and exclusion.
    fn key(&self) -> MiddlewareKey;

    fn wrap(&self, next: Handler, route: &RouteEntry) -> Handler;
}
