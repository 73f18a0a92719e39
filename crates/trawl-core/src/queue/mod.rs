//! Task lease queue: status, lease state machine and store backends.

pub mod file;
pub mod lease;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod state;

#[cfg(test)]
mod properties;

use std::sync::Arc;

use tracing::info;

pub use self::file::JsonFileTaskStore;
pub use self::lease::{DEFAULT_LEASE_DURATION, LeaseToken, Resolution};
pub use self::memory::InMemoryTaskStore;
#[cfg(feature = "postgres")]
pub use self::postgres::PgTaskStore;
pub use self::state::TaskStatus;

use crate::config::StoreConfig;
use crate::error::TrawlError;
use crate::ports::TaskStore;

/// An opened store backend.
///
/// 具体型を保持しておき、backend 固有の操作（replace_all / close）に使う。
#[derive(Clone)]
pub enum StoreBackend {
    Memory(Arc<InMemoryTaskStore>),
    JsonFile(Arc<JsonFileTaskStore>),
    #[cfg(feature = "postgres")]
    Postgres(Arc<PgTaskStore>),
}

impl StoreBackend {
    pub async fn open(config: &StoreConfig) -> Result<Self, TrawlError> {
        match config {
            StoreConfig::Memory => {
                info!(backend = "memory", "opening task store");
                Ok(StoreBackend::Memory(Arc::new(InMemoryTaskStore::new())))
            }
            StoreConfig::JsonFile { path } => {
                info!(backend = "json_file", path = %path.display(), "opening task store");
                Ok(StoreBackend::JsonFile(Arc::new(
                    JsonFileTaskStore::open(path).await?,
                )))
            }
            #[cfg(feature = "postgres")]
            StoreConfig::Postgres {
                url,
                max_connections,
            } => {
                info!(backend = "postgres", "opening task store");
                let store = PgTaskStore::connect(url, *max_connections).await?;
                store.migrate().await?;
                Ok(StoreBackend::Postgres(Arc::new(store)))
            }
            #[cfg(not(feature = "postgres"))]
            StoreConfig::Postgres { .. } => Err(TrawlError::BackendUnavailable("postgres")),
        }
    }

    pub fn as_store(&self) -> Arc<dyn TaskStore> {
        match self {
            StoreBackend::Memory(s) => s.clone(),
            StoreBackend::JsonFile(s) => s.clone(),
            #[cfg(feature = "postgres")]
            StoreBackend::Postgres(s) => s.clone(),
        }
    }

    /// Release backend resources (the postgres pool). Other backends have nothing to close.
    pub async fn close(&self) {
        #[cfg(feature = "postgres")]
        if let StoreBackend::Postgres(s) = self {
            s.close().await;
        }
    }
}
