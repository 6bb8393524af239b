pub mod file_store;
pub mod memory_store;
pub mod sqlite_store;

pub use file_store::JsonFileStore;
pub use memory_store::InMemoryArtifactStore;
pub use sqlite_store::SqliteArtifactStore;

use crate::config::EngineEnvConfig;
use crate::domain::ports::ArtifactStore;
use anyhow::Result;
use std::sync::Arc;

/// SQLite when `database_url` is set, JSON files under `artifact_dir` otherwise.
pub async fn open_store(config: &EngineEnvConfig) -> Result<Arc<dyn ArtifactStore>> {
    match &config.database_url {
        Some(url) => Ok(Arc::new(SqliteArtifactStore::new(url).await?)),
        None => Ok(Arc::new(JsonFileStore::new(&config.artifact_dir).await?)),
    }
}
