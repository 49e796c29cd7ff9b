pub mod compile;
pub mod middleware;
pub mod registry;
pub mod router;

pub use compile::{MethodMismatch, compile, compile_dispatch};
pub use middleware::Middleware;
pub use registry::MiddlewareRegistry;
pub use router::CompiledRouter;
