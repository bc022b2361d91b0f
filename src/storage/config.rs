//! Selection of the raw-data storage backend

use std::str::FromStr;
use std::sync::Arc;

use log::info;

use crate::config::AppConfig;
use crate::error::Error;
use crate::storage::hdfs_store::HdfsStore;
use crate::storage::local_store::LocalFilesystemStore;
use crate::storage::s3_store::S3Store;
use crate::storage::StorageBackend;

/// Available raw-data storage backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Hdfs,
    Filesystem,
    AwsS3,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Hdfs => "hdfs",
            BackendKind::Filesystem => "filesystem",
            BackendKind::AwsS3 => "aws_s3",
        }
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    /// Exact, case-sensitive match on the configured name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hdfs" => Ok(BackendKind::Hdfs),
            "filesystem" => Ok(BackendKind::Filesystem),
            "aws_s3" => Ok(BackendKind::AwsS3),
            other => Err(Error::Configuration(format!("{} is not supported", other))),
        }
    }
}

/// Build the backend named by `nosql_storage`.
///
/// Fails before any data is touched when the name is unknown, its section is
/// missing, or the backend cannot be opened.
pub async fn select_backend(config: &AppConfig) -> Result<Arc<dyn StorageBackend>, Error> {
    let kind: BackendKind = config.nosql_storage.parse()?;
    info!("Selected storage backend: {}", kind.as_str());

    let backend: Arc<dyn StorageBackend> = match kind {
        BackendKind::Hdfs => {
            let hdfs = config.hdfs.as_ref().ok_or_else(|| missing_section(kind, "hdfs"))?;
            Arc::new(HdfsStore::new(hdfs)?)
        }
        BackendKind::Filesystem => {
            let filesystem = config
                .filesystem
                .as_ref()
                .ok_or_else(|| missing_section(kind, "filesystem"))?;
            Arc::new(LocalFilesystemStore::new(filesystem)?)
        }
        BackendKind::AwsS3 => {
            let minio = config.minio.as_ref().ok_or_else(|| missing_section(kind, "minio"))?;
            Arc::new(S3Store::new(minio).await?)
        }
    };
    Ok(backend)
}

fn missing_section(kind: BackendKind, section: &str) -> Error {
    Error::Configuration(format!(
        "nosql_storage selects {} but the {} section is missing",
        kind.as_str(),
        section
    ))
}
