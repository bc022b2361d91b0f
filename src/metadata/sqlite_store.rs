//! SQLite implementation of MetadataStore

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::config::MetadataConfig;
use crate::error::{Error, MetadataError};
use crate::metadata::{check_identity, MetadataStore, StreamIdentity, StreamMetadata, StreamRecord};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS stream_metadata (
    stream_id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    owner_id TEXT NOT NULL,
    metadata TEXT NOT NULL,
    start_time TEXT,
    end_time TEXT
);
CREATE INDEX IF NOT EXISTS stream_metadata_owner ON stream_metadata(owner_id);";

const SELECT_COLUMNS: &str = "SELECT stream_id, name, owner_id, metadata FROM stream_metadata";

/// SQLite implementation of MetadataStore.
///
/// The connection is shared behind a mutex and every query runs on the
/// blocking thread pool.
pub struct SqliteMetadataStore {
    conn: Arc<Mutex<Connection>>,
}

/// Raw column values of one row
struct StoredRow {
    stream_id: String,
    name: String,
    owner_id: String,
    metadata: String,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            stream_id: row.get(0)?,
            name: row.get(1)?,
            owner_id: row.get(2)?,
            metadata: row.get(3)?,
        })
    }

    fn identity(&self) -> Result<StreamIdentity, MetadataError> {
        Ok(StreamIdentity {
            stream_id: parse_uuid(&self.stream_id)?,
            name: self.name.clone(),
            owner_id: parse_uuid(&self.owner_id)?,
        })
    }

    fn into_record(self) -> Result<StreamRecord, MetadataError> {
        let identity = self.identity()?;
        let metadata: StreamMetadata = serde_json::from_str(&self.metadata)?;
        Ok(StreamRecord { identity, metadata })
    }
}

fn parse_uuid(value: &str) -> Result<Uuid, MetadataError> {
    Uuid::parse_str(value).map_err(|e| MetadataError::Corrupt(format!("bad uuid '{}': {}", value, e)))
}

impl SqliteMetadataStore {
    /// Open (and create if needed) the database named by `db_path`
    pub fn new(config: &MetadataConfig) -> Result<Self, Error> {
        let opened = if config.db_path == ":memory:" {
            Connection::open_in_memory()
        } else {
            if let Some(parent) = Path::new(&config.db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        Error::Configuration(format!(
                            "cannot create metadata directory {}: {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
            }
            Connection::open(&config.db_path)
        };
        let conn = opened.map_err(|e| Error::Configuration(format!("cannot open metadata database {}: {}", config.db_path, e)))?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| Error::Configuration(format!("cannot create metadata schema: {}", e)))?;

        info!("Using SQLite metadata store at {}", config.db_path);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, MetadataError>
    where
        F: FnOnce(&mut Connection) -> Result<T, MetadataError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| MetadataError::Task("metadata connection lock poisoned".to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| MetadataError::Task(e.to_string()))?
    }
}

fn find_one(conn: &Connection, column: &str, value: &str) -> Result<Option<StoredRow>, MetadataError> {
    let sql = format!("{} WHERE {} = ?1", SELECT_COLUMNS, column);
    Ok(conn
        .query_row(&sql, params![value], StoredRow::from_row)
        .optional()?)
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn get_metadata_by_stream_name(&self, name: &str) -> Result<Option<StreamRecord>, MetadataError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            find_one(conn, "name", &name)?
                .map(StoredRow::into_record)
                .transpose()
        })
        .await
    }

    async fn get_metadata_by_stream_id(&self, stream_id: Uuid) -> Result<Option<StreamRecord>, MetadataError> {
        self.with_conn(move |conn| {
            find_one(conn, "stream_id", &stream_id.to_string())?
                .map(StoredRow::into_record)
                .transpose()
        })
        .await
    }

    async fn save_metadata(&self, record: &StreamRecord) -> Result<(), MetadataError> {
        let record = record.clone();
        let metadata = serde_json::to_string(&record.metadata)?;

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let identity = &record.identity;

            let by_id = find_one(&tx, "stream_id", &identity.stream_id.to_string())?
                .map(|row| row.identity())
                .transpose()?;
            let by_name = find_one(&tx, "name", &identity.name)?
                .map(|row| row.identity())
                .transpose()?;
            check_identity(identity, by_id.as_ref(), by_name.as_ref())?;

            tx.execute(
                "INSERT INTO stream_metadata (stream_id, name, owner_id, metadata, start_time, end_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(stream_id) DO UPDATE SET
                    metadata = excluded.metadata,
                    start_time = excluded.start_time,
                    end_time = excluded.end_time",
                params![
                    identity.stream_id.to_string(),
                    identity.name,
                    identity.owner_id.to_string(),
                    metadata,
                    record.metadata.start_time.map(|t| t.to_rfc3339()),
                    record.metadata.end_time.map(|t| t.to_rfc3339()),
                ],
            )?;
            tx.commit()?;

            debug!("Saved metadata for stream {} ({})", identity.name, identity.stream_id);
            Ok(())
        })
        .await
    }

    async fn list_streams_by_owner(&self, owner_id: Uuid) -> Result<Vec<StreamIdentity>, MetadataError> {
        self.with_conn(move |conn| {
            let sql = format!("{} WHERE owner_id = ?1 ORDER BY name", SELECT_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![owner_id.to_string()], StoredRow::from_row)?;

            let mut identities = Vec::new();
            for row in rows {
                identities.push(row?.identity()?);
            }
            Ok(identities)
        })
        .await
    }
}
