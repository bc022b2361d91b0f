//! Metadata Storage Layer Abstraction
//!
//! This module provides an abstraction over the store that keeps stream
//! identities and their descriptive metadata, so the stream handler can use
//! SQLite in production and an in-memory store in tests.

pub mod mock_store;
pub mod sqlite_store;


use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MetadataError;

/// Who a stream is and who owns it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamIdentity {
    /// Durable key used to address payloads
    pub stream_id: Uuid,
    /// Caller-facing lookup key
    pub name: String,
    pub owner_id: Uuid,
}

impl StreamIdentity {
    /// New identity with a freshly minted stream id
    pub fn new(name: impl Into<String>, owner_id: Uuid) -> Self {
        Self::with_id(Uuid::new_v4(), name, owner_id)
    }

    pub fn with_id(stream_id: Uuid, name: impl Into<String>, owner_id: Uuid) -> Self {
        Self {
            stream_id,
            name: name.into(),
            owner_id,
        }
    }
}

/// One column of the stream's samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataDescriptor {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub name: String,
    pub identifier: Uuid,
}

/// Descriptive metadata of a stream. Stored as-is; its schema content is
/// not interpreted here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamMetadata {
    #[serde(default)]
    pub data_descriptor: Vec<DataDescriptor>,
    /// Producing application and module, free-form
    #[serde(default)]
    pub execution_context: serde_json::Value,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stream_type: Option<String>,
}

/// Unit persisted and returned by a metadata store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub identity: StreamIdentity,
    pub metadata: StreamMetadata,
}

/// Trait defining the metadata storage interface
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Record registered under `name`; `None` when unknown
    async fn get_metadata_by_stream_name(&self, name: &str) -> Result<Option<StreamRecord>, MetadataError>;

    async fn get_metadata_by_stream_id(&self, stream_id: Uuid) -> Result<Option<StreamRecord>, MetadataError>;

    /// Insert or update by stream id. Never re-points an existing identity.
    async fn save_metadata(&self, record: &StreamRecord) -> Result<(), MetadataError>;

    /// Identities of every stream owned by `owner_id`, ordered by name
    async fn list_streams_by_owner(&self, owner_id: Uuid) -> Result<Vec<StreamIdentity>, MetadataError>;
}

/// Reject a save that would change an existing identity.
///
/// `by_id` is the stored identity with the same stream id, `by_name` the one
/// with the same name.
pub(crate) fn check_identity(
    incoming: &StreamIdentity,
    by_id: Option<&StreamIdentity>,
    by_name: Option<&StreamIdentity>,
) -> Result<(), MetadataError> {
    if let Some(existing) = by_id {
        if existing.name != incoming.name || existing.owner_id != incoming.owner_id {
            return Err(MetadataError::IdentityConflict(format!(
                "stream {} is registered as '{}' of owner {}",
                existing.stream_id, existing.name, existing.owner_id
            )));
        }
    }
    if let Some(existing) = by_name {
        if existing.stream_id != incoming.stream_id {
            return Err(MetadataError::IdentityConflict(format!(
                "name '{}' already belongs to stream {}",
                existing.name, existing.stream_id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_metadata_serializes_to_defaults() {
        let parsed: StreamMetadata = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, StreamMetadata::default());
    }

    #[test]
    fn test_check_identity() {
        let owner = Uuid::new_v4();
        let identity = StreamIdentity::new("hr_stream", owner);
        assert!(check_identity(&identity, None, None).is_ok());
        assert!(check_identity(&identity, Some(&identity), Some(&identity)).is_ok());

        let renamed = StreamIdentity::with_id(identity.stream_id, "other", owner);
        assert!(matches!(
            check_identity(&renamed, Some(&identity), None),
            Err(MetadataError::IdentityConflict(_))
        ));

        let same_name = StreamIdentity::new("hr_stream", owner);
        assert!(matches!(
            check_identity(&same_name, None, Some(&identity)),
            Err(MetadataError::IdentityConflict(_))
        ));
    }
}
