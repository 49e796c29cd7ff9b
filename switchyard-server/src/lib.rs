pub mod app;
pub mod routes;
pub mod serve;

pub use app::{AppState, build_app};
pub use serve::serve;
