//! Error types for the storage, metadata and stream-handling layers.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::metadata::StreamRecord;
use crate::storage::PartitionKey;

/// Errors raised by a storage backend while moving payload bytes.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Local I/O failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// A resolved path left the configured base directory.
    #[error("path {0} resolves outside the storage base directory")]
    PathEscape(PathBuf),

    /// Transport failure talking to WebHDFS.
    #[error("webhdfs request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// WebHDFS answered with a non-success status.
    #[error("webhdfs {op} returned {status}: {message}")]
    WebHdfs {
        op: &'static str,
        status: u16,
        message: String,
    },

    /// Object-store request failed.
    #[error("object store error: {0}")]
    S3(String),

    /// Stored bytes failed an integrity check.
    #[error("corrupt partition {0}")]
    Corrupt(String),

    /// Injected or otherwise unspecified backend failure.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by a metadata store.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("metadata serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The save would reassign an existing identity.
    #[error("identity conflict: {0}")]
    IdentityConflict(String),

    /// A stored row could not be turned back into a record.
    #[error("corrupt metadata row: {0}")]
    Corrupt(String),

    #[error("metadata store task failed: {0}")]
    Task(String),

    #[error("metadata store unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned to callers of the stream handler.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad or missing input. Not retryable.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unsupported or unusable configuration. Not retryable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Payload write failed; nothing was recorded in the metadata store.
    #[error("failed to write partition {key}: {source}")]
    StorageWrite {
        key: PartitionKey,
        #[source]
        source: StorageError,
    },

    /// Payload read failed.
    #[error("failed to read stream {stream_id}: {source}")]
    StorageRead {
        stream_id: Uuid,
        #[source]
        source: StorageError,
    },

    /// Payload is durable but its metadata is stale or missing.
    #[error("payload stored but metadata write failed for stream {}: {source}", record.identity.stream_id)]
    MetadataWrite {
        record: Box<StreamRecord>,
        #[source]
        source: MetadataError,
    },

    #[error("failed to read stream metadata: {0}")]
    MetadataRead(#[source] MetadataError),

    /// Stored payload is not a valid sample encoding.
    #[error("failed to decode samples: {0}")]
    Decode(String),
}

impl Error {
    /// Whether resending the same call may succeed.
    ///
    /// An identity conflict never resolves by itself, even when it is only
    /// detected after the payload was written.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::MetadataWrite {
                source: MetadataError::IdentityConflict(_),
                ..
            } => false,
            Error::StorageWrite { .. }
            | Error::StorageRead { .. }
            | Error::MetadataWrite { .. }
            | Error::MetadataRead(_) => true,
            _ => false,
        }
    }

    /// Whether the payload and metadata stores now disagree.
    pub fn is_inconsistent(&self) -> bool {
        matches!(self, Error::MetadataWrite { .. })
    }

    /// Record left behind by a failed metadata write, for reconciliation.
    pub fn pending_record(&self) -> Option<&StreamRecord> {
        match self {
            Error::MetadataWrite { record, .. } => Some(record),
            _ => None,
        }
    }

    pub(crate) fn storage_read(stream_id: Uuid, source: StorageError) -> Self {
        match source {
            StorageError::PathEscape(path) => Error::Configuration(format!(
                "{} resolves outside the configured filesystem_path",
                path.display()
            )),
            source => Error::StorageRead { stream_id, source },
        }
    }

    pub(crate) fn storage_write(key: PartitionKey, source: StorageError) -> Self {
        match source {
            StorageError::PathEscape(path) => Error::Configuration(format!(
                "{} resolves outside the configured filesystem_path",
                path.display()
            )),
            source => Error::StorageWrite { key, source },
        }
    }
}
