//! Object store backend for S3-compatible services (AWS S3, MinIO)

use std::collections::BTreeSet;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use log::{debug, info, warn};
use uuid::Uuid;

use crate::config::MinioConfig;
use crate::error::{Error, StorageError};
use crate::storage::{Day, PartitionKey, StorageBackend};

/// Object metadata entry holding the hex MD5 of the payload
const CHECKSUM_METADATA_KEY: &str = "payload-md5";

/// Stores each partition as the object `<dir_prefix>/<stream_id>/<YYYYMMDD>`.
///
/// Writes go to the output bucket. Reads and listings also look in the input
/// bucket, where ingestion pipelines may have dropped partitions directly.
pub struct S3Store {
    client: Client,
    input_bucket: String,
    output_bucket: String,
    prefix: String,
}

impl S3Store {
    pub async fn new(config: &MinioConfig) -> Result<Self, Error> {
        if config.host.trim().is_empty() {
            return Err(Error::Configuration("minio.host must not be empty".to_string()));
        }
        if config.input_bucket_name.trim().is_empty() || config.output_bucket_name.trim().is_empty() {
            return Err(Error::Configuration(
                "minio input_bucket_name and output_bucket_name must not be empty".to_string(),
            ));
        }

        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "stream_vault",
        );
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(config.endpoint_url())
            .credentials_provider(credentials)
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        info!(
            "Using object storage at {} (output bucket {}, input bucket {})",
            config.endpoint_url(),
            config.output_bucket_name,
            config.input_bucket_name
        );
        Ok(Self {
            client: Client::from_conf(s3_config),
            input_bucket: config.input_bucket_name.clone(),
            output_bucket: config.output_bucket_name.clone(),
            prefix: config.dir_prefix.trim_matches('/').to_string(),
        })
    }

    fn stream_prefix(&self, stream_id: Uuid) -> String {
        if self.prefix.is_empty() {
            format!("{}/", stream_id)
        } else {
            format!("{}/{}/", self.prefix, stream_id)
        }
    }

    fn object_key(&self, key: &PartitionKey) -> String {
        format!("{}{}", self.stream_prefix(key.stream_id), key.day)
    }

    async fn get(&self, bucket: &str, object_key: &str) -> Result<Option<Bytes>, StorageError> {
        let response = match self.client.get_object().bucket(bucket).key(object_key).send().await {
            Ok(response) => response,
            Err(e) => {
                let e = e.into_service_error();
                if e.is_no_such_key() {
                    return Ok(None);
                }
                return Err(StorageError::S3(format!(
                    "get {}/{}: {}",
                    bucket,
                    object_key,
                    DisplayErrorContext(e)
                )));
            }
        };

        let expected = response
            .metadata()
            .and_then(|metadata| metadata.get(CHECKSUM_METADATA_KEY))
            .cloned();
        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(format!("read {}/{}: {}", bucket, object_key, e)))?
            .into_bytes();

        match expected {
            Some(expected) => verify_checksum(&data, &expected)
                .map_err(|actual| {
                    StorageError::Corrupt(format!(
                        "{}/{}: expected md5 {}, got {}",
                        bucket, object_key, expected, actual
                    ))
                })?,
            None => debug!("{}/{} carries no checksum", bucket, object_key),
        }
        Ok(Some(data))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| StorageError::S3(format!("list {}/{}: {}", bucket, prefix, DisplayErrorContext(e))))?;

            names.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .filter_map(|key| key.strip_prefix(prefix))
                    .map(str::to_string),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string())
                }
                _ => break,
            }
        }
        Ok(names)
    }
}

fn checksum(data: &[u8]) -> String {
    hex::encode(md5::compute(data).0)
}

/// Compare against a stored hex digest, returning the actual digest on mismatch
fn verify_checksum(data: &[u8], expected: &str) -> Result<(), String> {
    let actual = checksum(data);
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(actual)
    }
}

#[async_trait]
impl StorageBackend for S3Store {
    fn name(&self) -> &'static str {
        "aws_s3"
    }

    /// A single PUT replaces the object atomically.
    async fn write_file(&self, key: &PartitionKey, payload: Bytes) -> Result<(), StorageError> {
        let object_key = self.object_key(key);
        let len = payload.len();
        self.client
            .put_object()
            .bucket(&self.output_bucket)
            .key(&object_key)
            .metadata(CHECKSUM_METADATA_KEY, checksum(&payload))
            .body(ByteStream::from(payload))
            .send()
            .await
            .map_err(|e| {
                StorageError::S3(format!(
                    "put {}/{}: {}",
                    self.output_bucket,
                    object_key,
                    DisplayErrorContext(e)
                ))
            })?;

        debug!("Wrote {} bytes to {}/{}", len, self.output_bucket, object_key);
        Ok(())
    }

    async fn read_partition(&self, key: &PartitionKey) -> Result<Option<Bytes>, StorageError> {
        let object_key = self.object_key(key);
        if let Some(data) = self.get(&self.output_bucket, &object_key).await? {
            return Ok(Some(data));
        }
        if self.input_bucket == self.output_bucket {
            return Ok(None);
        }
        self.get(&self.input_bucket, &object_key).await
    }

    async fn list_days(&self, stream_id: Uuid) -> Result<Vec<Day>, StorageError> {
        let prefix = self.stream_prefix(stream_id);
        let mut names = self.list(&self.output_bucket, &prefix).await?;
        if self.input_bucket != self.output_bucket {
            names.extend(self.list(&self.input_bucket, &prefix).await?);
        }

        let days: BTreeSet<Day> = names
            .into_iter()
            .filter(|name| !name.contains('/'))
            .filter_map(|name| match name.parse::<Day>() {
                Ok(day) => Some(day),
                Err(_) => {
                    warn!("Ignoring unexpected object {}{}", prefix, name);
                    None
                }
            })
            .collect();
        Ok(days.into_iter().collect())
    }
}
