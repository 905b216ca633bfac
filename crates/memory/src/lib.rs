//! Memory store implementations for Falcon.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use falcon_core::error::StorageError;
use falcon_core::memory::MemoryStore;
use std::sync::Arc;

/// Open the store selected by `memory.backend`.
pub async fn build_from_config(
    config: &falcon_config::AppConfig,
) -> Result<Arc<dyn MemoryStore>, StorageError> {
    match config.memory.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let path = config.memory.resolved_database_path();
            Ok(Arc::new(SqliteStore::new(&path).await?))
        }
        other => Err(StorageError::Unavailable(format!(
            "memory backend '{other}' is not available in this build"
        ))),
    }
}
