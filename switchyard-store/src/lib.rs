pub mod file;
pub mod memory;
pub mod schema;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use switchyard_core::config::{StoreBackend, StoreConfig};
use thiserror::Error;
use uuid::Uuid;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use schema::{AccessLogRecord, BlacklistEntry};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Access record not found: {0}")]
    RecordNotFound(Uuid),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// The two collections the access guard reads and writes.
///
/// Each call is a single-document operation; implementations make each one
/// atomic and nothing more.
#[async_trait]
pub trait AccessStore: Send + Sync {
    /// A blacklist entry for `ip` that is permanent or expires after `now`.
    async fn find_active_block(
        &self,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<BlacklistEntry>, StoreError>;

    /// Access records for `ip` with `response_code == code` created at or after `since`.
    async fn count_responses(
        &self,
        ip: &str,
        code: u16,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn insert_access(&self, record: AccessLogRecord) -> Result<(), StoreError>;

    /// The one in-place update the access log supports.
    async fn update_response_code(
        &self,
        id: Uuid,
        code: u16,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn insert_blacklist(&self, entry: BlacklistEntry) -> Result<(), StoreError>;
}

/// Open the backend selected in config.
pub async fn open(config: &StoreConfig) -> Result<Arc<dyn AccessStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory access store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::File => {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| StoreError::Unavailable("store.path is not set".into()))?;
            Ok(Arc::new(FileStore::open(path, config.retention()).await?))
        }
    }
}
