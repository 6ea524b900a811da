//! CLI Common Utilities
//!
//! Shared setup for command handlers.

use std::sync::Arc;

use tokio::runtime::Runtime;

use crate::config::{Config, ConfigLoader};
use crate::storage::{Database, DocumentStore};
use crate::types::{RepodocError, Result};

/// Open (and initialize) the document record store named by the config
pub fn open_store(config: &Config) -> Result<DocumentStore> {
    let path = ConfigLoader::database_path(config);
    let db = Database::open(&path)?;
    db.initialize()?;
    tracing::debug!(path = %path.display(), "Opened document store");
    Ok(DocumentStore::new(Arc::new(db)))
}

/// Multi-threaded runtime for commands that drive the async pipeline
pub fn runtime() -> Result<Runtime> {
    Runtime::new().map_err(|e| RepodocError::Config(format!("Failed to start runtime: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;

    #[test]
    fn test_open_store_uses_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records").join("repodoc.db");
        let config = Config {
            storage: StorageConfig {
                database_path: Some(path.clone()),
            },
            ..Default::default()
        };

        let store = open_store(&config).unwrap();
        assert!(store.list(None).unwrap().is_empty());
        assert!(path.exists());
    }
}
