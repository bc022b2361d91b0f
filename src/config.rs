//! Application Configuration
//!
//! This module provides configuration management for the stream store,
//! loaded once at process start from a YAML document.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use log::info;

use crate::error::Error;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "STREAM_VAULT_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "stream_vault.yaml";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Active raw-data backend: `hdfs`, `filesystem` or `aws_s3`
    pub nosql_storage: String,
    /// Distributed filesystem settings
    #[serde(default)]
    pub hdfs: Option<HdfsConfig>,
    /// Local filesystem settings
    #[serde(default)]
    pub filesystem: Option<FilesystemConfig>,
    /// Object store settings
    #[serde(default)]
    pub minio: Option<MinioConfig>,
    /// Metadata store settings
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Distributed filesystem (WebHDFS) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HdfsConfig {
    /// Namenode host
    pub host: String,
    /// Namenode RPC port, used for the canonical `hdfs://` URL
    pub port: u16,
    /// Namenode HTTP port serving the WebHDFS API
    #[serde(default = "default_webhdfs_port")]
    pub webhdfs_port: u16,
    /// Directory holding raw stream files
    pub raw_files_dir: String,
    /// User name passed to WebHDFS
    #[serde(default)]
    pub user: Option<String>,
}

fn default_webhdfs_port() -> u16 {
    9870
}

/// Local filesystem configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemConfig {
    /// Base directory for raw stream files
    pub filesystem_path: String,
}

/// Object store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinioConfig {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub access_key: String,
    pub secret_key: String,
    /// Use https for the endpoint
    #[serde(default)]
    pub secure: bool,
    #[serde(default = "default_region")]
    pub region: String,
    /// Bucket that ingestion pipelines drop raw data into
    pub input_bucket_name: String,
    /// Bucket this store writes partitions to
    pub output_bucket_name: String,
    /// Key prefix for every stream object
    pub dir_prefix: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl MinioConfig {
    /// Endpoint URL built from host, port and scheme
    pub fn endpoint_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        match self.port {
            Some(port) => format!("{}://{}:{}", scheme, self.host, port),
            None => format!("{}://{}", scheme, self.host),
        }
    }
}

/// Metadata backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// SQLite database file path, or `:memory:`
    pub db_path: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            db_path: "./data/metadata.sqlite".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Path to log4rs configuration file
    pub config_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            config_file: "stream_log.yaml".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load configuration from the file named by `STREAM_VAULT_CONFIG`
    pub fn from_env() -> Result<Self, Error> {
        let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(path)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml_str(content: &str) -> Result<Self, Error> {
        let mut config: AppConfig = serde_yaml::from_str(content)
            .map_err(|e| Error::Configuration(format!("invalid configuration: {}", e)))?;
        config.normalize();
        Ok(config)
    }

    /// Configuration for a local filesystem store rooted at `path`
    pub fn for_filesystem(path: impl Into<String>, db_path: impl Into<String>) -> Self {
        Self {
            nosql_storage: "filesystem".to_string(),
            hdfs: None,
            filesystem: Some(FilesystemConfig {
                filesystem_path: path.into(),
            }),
            minio: None,
            metadata: MetadataConfig {
                db_path: db_path.into(),
            },
            logging: LoggingConfig::default(),
        }
    }

    fn normalize(&mut self) {
        self.nosql_storage = self.nosql_storage.trim().to_string();
        if let Some(hdfs) = self.hdfs.as_mut() {
            if !hdfs.raw_files_dir.is_empty() && !hdfs.raw_files_dir.ends_with('/') {
                hdfs.raw_files_dir.push('/');
            }
        }
    }
}
