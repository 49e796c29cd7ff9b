//! Access-control guard and the request facts it logs.

pub mod client_ip;
mod guard;
pub mod url;

pub use guard::AccessGuard;
