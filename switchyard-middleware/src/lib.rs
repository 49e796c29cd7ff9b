pub mod access;
pub mod auth;
pub mod correlation;
pub mod cors;
pub mod method;

use std::sync::Arc;
use switchyard_core::{SwitchyardConfig, SwitchyardError};
use switchyard_pipeline::MiddlewareRegistry;
use switchyard_store::AccessStore;

pub use access::AccessGuard;
pub use auth::{AccountService, AuthError, AuthMiddleware, AuthValidator};
pub use correlation::CorrelationMiddleware;
pub use cors::CorsMiddleware;
pub use method::MethodMiddleware;

/// Shared external resources handed to middleware at construction.
#[derive(Clone)]
pub struct Resources {
    pub store: Arc<dyn AccessStore>,
    pub validator: Arc<dyn AuthValidator>,
}

impl Resources {
    /// The account service client built from `config.auth`.
    pub fn new(config: &SwitchyardConfig, store: Arc<dyn AccessStore>) -> Result<Self, SwitchyardError> {
        Ok(Self {
            store,
            validator: Arc::new(AccountService::new(&config.auth)?),
        })
    }
}

/// Register every built-in middleware under its well-known key.
pub fn register_all(
    registry: &mut MiddlewareRegistry,
    config: &SwitchyardConfig,
    resources: Resources,
) -> Result<(), SwitchyardError> {
    registry.register(Arc::new(CorrelationMiddleware::new(&config.correlation)?));
    registry.register(Arc::new(CorsMiddleware::new(&config.cors)?));
    registry.register(Arc::new(AccessGuard::new(config, resources.store)?));
    registry.register(Arc::new(MethodMiddleware::new(&config.routing)));
    registry.register(Arc::new(AuthMiddleware::new(resources.validator)));
    Ok(())
}
