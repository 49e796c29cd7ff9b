pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod path;
pub mod response;
pub mod route;
pub mod table;

pub use config::SwitchyardConfig;
pub use error::{ErrorCode, SwitchyardError};
pub use handler::{BoxFuture, Handler, Request, Response, handler};
pub use route::{HttpMethod, MiddlewareKey, RouteAuth, RouteEntry, RouteGroup, RouteNode};
pub use table::{Dispatch, DispatchTable, DuplicateRoutePolicy, ResolvedRoute};
