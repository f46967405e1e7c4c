//! `DurableStore` adapters
//!
//! - [`InMemoryDurableStore`]: process-local, for tests and ephemeral queues
//! - [`FileDurableStore`]: one JSON document per key, atomic replace (default)
//! - [`SqliteDurableStore`]: one row per key in a pooled SQLite database

pub mod file;
pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use fieldsync_common::error::{CommonError, CommonResult};
use fieldsync_core::DurableStore;
use fieldsync_domain::{StorageBackend, StorageConfig};
use tracing::{info, warn};

pub use file::FileDurableStore;
pub use memory::InMemoryDurableStore;
pub use sqlite::SqliteDurableStore;

/// Build the durable store selected by `config`
pub fn open_durable_store(config: &StorageConfig) -> CommonResult<Arc<dyn DurableStore>> {
    let require_path = || {
        config.path.clone().ok_or_else(|| {
            CommonError::config_field(
                "storage.path",
                format!("a path is required for the {} backend", config.backend),
            )
        })
    };

    let store: Arc<dyn DurableStore> = match config.backend {
        StorageBackend::Memory => {
            warn!("In-memory storage selected; queued operations will not survive a restart");
            Arc::new(InMemoryDurableStore::new())
        }
        StorageBackend::File => Arc::new(FileDurableStore::new(require_path()?)),
        StorageBackend::Sqlite => Arc::new(SqliteDurableStore::open(require_path()?)?),
    };

    info!(backend = %config.backend, "Durable store ready");
    Ok(store)
}
