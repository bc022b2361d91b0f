//! Application State Management
//!
//! This module builds the stream handler and its collaborators from the
//! configuration, following the dependency injection pattern.

use std::sync::Arc;

use log::info;

use crate::config::AppConfig;
use crate::error::Error;
use crate::logging;
use crate::metadata::mock_store::MockMetadataStore;
use crate::metadata::sqlite_store::SqliteMetadataStore;
use crate::metadata::MetadataStore;
use crate::service::StreamHandler;
use crate::storage::mock_store::MockStorageBackend;
use crate::storage::{select_backend, StorageBackend};

/// Application state containing the stream handler and its configuration
#[derive(Clone)]
pub struct AppState {
    pub stream_handler: Arc<StreamHandler>,
    pub config: AppConfig,
}

impl AppState {
    /// Load configuration from `STREAM_VAULT_CONFIG`, set up logging and
    /// build the application state
    pub async fn from_env() -> Result<Self, Error> {
        let config = AppConfig::from_env()?;
        logging::init(&config.logging)?;
        Self::from_config(config).await
    }

    /// Create application state from configuration.
    ///
    /// Fails when the selected backend or the metadata store cannot be
    /// opened, before any data is accepted.
    pub async fn from_config(config: AppConfig) -> Result<Self, Error> {
        info!("Initializing application state with configuration");

        let backend = select_backend(&config).await?;
        let metadata_store: Arc<dyn MetadataStore> = Arc::new(SqliteMetadataStore::new(&config.metadata)?);
        let stream_handler = Arc::new(StreamHandler::new(backend, metadata_store));

        info!("Application state initialized successfully");
        Ok(Self {
            stream_handler,
            config,
        })
    }

    /// Create application state for testing with in-memory collaborators
    pub fn new_for_testing() -> Self {
        let backend: Arc<dyn StorageBackend> = Arc::new(MockStorageBackend::new());
        let metadata_store: Arc<dyn MetadataStore> = Arc::new(MockMetadataStore::new());

        let mut config = AppConfig::for_filesystem("", ":memory:");
        config.nosql_storage = "mock".to_string();
        config.filesystem = None;

        Self {
            stream_handler: Arc::new(StreamHandler::new(backend, metadata_store)),
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{StreamIdentity, StreamMetadata};
    use crate::service::DataSet;
    use bytes::Bytes;
    use tempfile::tempdir;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_from_config_filesystem() {
        let dir = tempdir().unwrap();
        let config = AppConfig::for_filesystem(dir.path().to_string_lossy(), ":memory:");
        let state = AppState::from_config(config).await.unwrap();
        assert_eq!(state.stream_handler.backend_name(), "filesystem");
    }

    #[tokio::test]
    async fn test_from_config_rejects_unwritable_path() {
        let config = AppConfig::for_filesystem("/nonexistent/stream_vault/raw", ":memory:");
        let err = AppState::from_config(config).await.err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_new_for_testing() {
        let state = AppState::new_for_testing();
        assert_eq!(state.stream_handler.backend_name(), "mock");

        let identity = StreamIdentity::new("hr_stream", Uuid::new_v4());
        state
            .stream_handler
            .save_stream(&identity, "2024-01-01".parse().unwrap(), Bytes::from_static(b"x"), StreamMetadata::default())
            .await
            .unwrap();
        let stream = state
            .stream_handler
            .get_stream("hr_stream", None, None, None, DataSet::Complete)
            .await
            .unwrap();
        assert_eq!(stream.payload(), b"x");
    }
}
