use crate::middleware::Middleware;
use std::collections::HashMap;
use std::sync::Arc;
use switchyard_core::MiddlewareKey;

/// Middleware implementations by key.
///
/// Built once at startup, read-only while routes compile.
pub struct MiddlewareRegistry {
    middlewares: HashMap<MiddlewareKey, Arc<dyn Middleware>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self {
            middlewares: HashMap::new(),
        }
    }

    /// Register a middleware. A later registration under the same key wins.
    pub fn register(&mut self, middleware: Arc<dyn Middleware>) {
        let key = middleware.key();
        tracing::info!(middleware = %key, "Registered middleware");
        self.middlewares.insert(key, middleware);
    }

    pub fn get(&self, key: &MiddlewareKey) -> Option<&Arc<dyn Middleware>> {
        self.middlewares.get(key)
    }

    /// Registered keys, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.middlewares.keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

impl Default for MiddlewareRegistry {
    fn default() -> Self {
        Self::new()
    }
}
