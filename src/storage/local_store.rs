//! Local filesystem storage backend

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info, warn};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::config::FilesystemConfig;
use crate::error::{Error, StorageError};
use crate::storage::key_lock::KeyLocks;
use crate::storage::{Day, PartitionKey, StorageBackend};

/// Stores each partition as `<filesystem_path>/<stream_id>/<YYYYMMDD>`
pub struct LocalFilesystemStore {
    base: PathBuf,
    locks: KeyLocks,
}

impl LocalFilesystemStore {
    /// Open the store, failing if the base path is missing or not writable
    pub fn new(config: &FilesystemConfig) -> Result<Self, Error> {
        if config.filesystem_path.trim().is_empty() {
            return Err(Error::Configuration(
                "filesystem.filesystem_path must not be empty".to_string(),
            ));
        }

        let base = std::fs::canonicalize(&config.filesystem_path).map_err(|e| {
            Error::Configuration(format!(
                "{} path is not accessible ({}). Please check your configuration.",
                config.filesystem_path, e
            ))
        })?;
        if !base.is_dir() {
            return Err(Error::Configuration(format!(
                "{} is not a directory. Please check your configuration.",
                config.filesystem_path
            )));
        }
        check_writable(&base).map_err(|e| {
            Error::Configuration(format!(
                "{} path is not writable ({}). Please check your configuration.",
                config.filesystem_path, e
            ))
        })?;

        info!("Using local filesystem storage at {}", base.display());
        Ok(Self {
            base,
            locks: KeyLocks::new(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    /// Directory holding a stream's partitions, verified to stay under the base
    async fn stream_dir(&self, stream_id: Uuid) -> Result<PathBuf, StorageError> {
        let dir = self.base.join(stream_id.to_string());
        if dir.components().any(|c| matches!(c, Component::ParentDir)) || !dir.starts_with(&self.base) {
            return Err(StorageError::PathEscape(dir));
        }

        match fs::canonicalize(&dir).await {
            Ok(real) if real.starts_with(&self.base) => Ok(dir),
            Ok(real) => Err(StorageError::PathEscape(real)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(dir),
            Err(e) => Err(StorageError::Io("error resolving stream directory", e)),
        }
    }

    #[cfg(test)]
    pub(crate) fn locks(&self) -> &KeyLocks {
        &self.locks
    }
}

fn check_writable(base: &Path) -> std::io::Result<()> {
    let probe = base.join(format!(".write-probe-{}", Uuid::new_v4()));
    std::fs::write(&probe, b"")?;
    std::fs::remove_file(&probe)
}

async fn write_then_rename(temp: &Path, target: &Path, payload: &[u8]) -> Result<(), StorageError> {
    let mut file = fs::File::create(temp)
        .await
        .map_err(|e| StorageError::Io("error creating temp file", e))?;
    file.write_all(payload)
        .await
        .map_err(|e| StorageError::Io("error writing temp file", e))?;
    file.sync_all()
        .await
        .map_err(|e| StorageError::Io("error syncing temp file", e))?;
    drop(file);
    fs::rename(temp, target)
        .await
        .map_err(|e| StorageError::Io("error renaming temp file", e))
}

#[async_trait]
impl StorageBackend for LocalFilesystemStore {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    async fn write_file(&self, key: &PartitionKey, payload: Bytes) -> Result<(), StorageError> {
        let _guard = self.locks.lock(*key).await;

        let dir = self.stream_dir(key.stream_id).await?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::Io("error creating stream directory", e))?;

        let target = dir.join(key.day.to_string());
        let temp = dir.join(format!(".{}.tmp-{}", key.day, Uuid::new_v4()));

        if let Err(e) = write_then_rename(&temp, &target, &payload).await {
            if let Err(cleanup) = fs::remove_file(&temp).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!("Failed to remove temp file {}: {}", temp.display(), cleanup);
                }
            }
            return Err(e);
        }

        debug!("Wrote {} bytes to {}", payload.len(), target.display());
        Ok(())
    }

    async fn read_partition(&self, key: &PartitionKey) -> Result<Option<Bytes>, StorageError> {
        let path = self.stream_dir(key.stream_id).await?.join(key.day.to_string());
        match fs::read(&path).await {
            Ok(data) => {
                debug!("Read {} bytes from {}", data.len(), path.display());
                Ok(Some(Bytes::from(data)))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io("error reading partition", e)),
        }
    }

    async fn list_days(&self, stream_id: Uuid) -> Result<Vec<Day>, StorageError> {
        let dir = self.stream_dir(stream_id).await?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io("error reading stream directory", e)),
        };

        let mut days = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::Io("error reading stream directory entry", e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') {
                continue;
            }
            match name.parse::<Day>() {
                Ok(day) => days.push(day),
                Err(_) => warn!("Ignoring unexpected file {} in {}", name, dir.display()),
            }
        }
        days.sort();
        Ok(days)
    }
}
