//! Distributed filesystem storage backend speaking the WebHDFS REST API

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info, warn};
use reqwest::{redirect, Client, Method, Response, StatusCode};
use serde::Deserialize;
use uuid::Uuid;

use crate::config::HdfsConfig;
use crate::error::{Error, StorageError};
use crate::storage::{Day, PartitionKey, StorageBackend};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Stores each partition as `<raw_files_dir>/<stream_id>/<YYYYMMDD>` in HDFS
pub struct HdfsStore {
    client: Client,
    /// `http://<host>:<webhdfs_port>/webhdfs/v1`
    endpoint: String,
    /// Absolute HDFS directory, no trailing slash
    root: String,
    /// `hdfs://<host>:<port>/<raw_files_dir>/`
    base_url: String,
    user: Option<String>,
}

#[derive(Deserialize)]
struct FileStatuses {
    #[serde(rename = "FileStatuses")]
    statuses: FileStatusList,
}

#[derive(Deserialize)]
struct FileStatusList {
    #[serde(rename = "FileStatus", default)]
    entries: Vec<FileStatus>,
}

#[derive(Deserialize)]
struct FileStatus {
    #[serde(rename = "pathSuffix")]
    path_suffix: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct BooleanResponse {
    boolean: bool,
}

#[derive(Deserialize)]
struct RemoteExceptionBody {
    #[serde(rename = "RemoteException")]
    exception: RemoteException,
}

#[derive(Deserialize)]
struct RemoteException {
    #[serde(default)]
    exception: String,
    #[serde(default)]
    message: String,
}

impl HdfsStore {
    pub fn new(config: &HdfsConfig) -> Result<Self, Error> {
        if config.host.trim().is_empty() {
            return Err(Error::Configuration("hdfs.host must not be empty".to_string()));
        }
        if config.port == 0 || config.webhdfs_port == 0 {
            return Err(Error::Configuration("hdfs ports must be non-zero".to_string()));
        }
        let dir = config.raw_files_dir.trim().trim_matches('/');
        if dir.is_empty() {
            return Err(Error::Configuration("hdfs.raw_files_dir must not be empty".to_string()));
        }
        if dir.split('/').any(|segment| segment == "..") {
            return Err(Error::Configuration(format!(
                "hdfs.raw_files_dir {} must not contain '..'",
                config.raw_files_dir
            )));
        }

        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Configuration(format!("cannot build webhdfs client: {}", e)))?;

        let store = Self {
            client,
            endpoint: format!("http://{}:{}/webhdfs/v1", config.host, config.webhdfs_port),
            root: format!("/{}", dir),
            base_url: format!("hdfs://{}:{}/{}/", config.host, config.port, dir),
            user: config.user.clone(),
        };
        info!("Using HDFS storage at {} via {}", store.base_url, store.endpoint);
        Ok(store)
    }

    /// Canonical `hdfs://` URL of the raw files directory
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Canonical `hdfs://` URL of a partition
    pub fn partition_url(&self, key: &PartitionKey) -> String {
        format!("{}{}", self.base_url, key.relative_path())
    }

    fn stream_path(&self, stream_id: Uuid) -> String {
        format!("{}/{}", self.root, stream_id)
    }

    fn partition_path(&self, key: &PartitionKey) -> String {
        format!("{}/{}", self.root, key.relative_path())
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        op: &'static str,
        extra: &[(&str, &str)],
    ) -> Result<Response, StorageError> {
        let mut query: Vec<(&str, &str)> = vec![("op", op)];
        if let Some(user) = &self.user {
            query.push(("user.name", user.as_str()));
        }
        query.extend_from_slice(extra);

        let response = self
            .client
            .request(method, format!("{}{}", self.endpoint, path))
            .query(&query)
            .send()
            .await?;
        Ok(response)
    }

    /// Follow the namenode's redirect to the datanode that serves the data
    async fn follow(
        &self,
        response: Response,
        method: Method,
        op: &'static str,
        body: Option<Bytes>,
    ) -> Result<Response, StorageError> {
        if !response.status().is_redirection() {
            return Ok(response);
        }
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or(StorageError::WebHdfs {
                op,
                status: response.status().as_u16(),
                message: "redirect without Location header".to_string(),
            })?;

        let mut request = self.client.request(method, location);
        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(body);
        }
        Ok(request.send().await?)
    }

    /// Upload to `temp`, then move it over `target` with a single RENAME.
    ///
    /// `renameoptions=OVERWRITE` replaces an existing partition in one
    /// namenode operation, so a failure leaves the previous file in place.
    async fn publish(&self, temp: &str, target: &str, payload: Bytes) -> Result<(), StorageError> {
        let response = self
            .call(Method::PUT, temp, "CREATE", &[("overwrite", "true")])
            .await?;
        let response = self.follow(response, Method::PUT, "CREATE", Some(payload)).await?;
        check(response, "CREATE").await?;

        let response = self
            .call(
                Method::PUT,
                temp,
                "RENAME",
                &[("destination", target), ("renameoptions", "OVERWRITE")],
            )
            .await?;
        let body = check(response, "RENAME").await?.text().await?;
        // Empty body on success; some gateways still answer with a boolean.
        if let Ok(BooleanResponse { boolean: false }) = serde_json::from_str::<BooleanResponse>(&body) {
            return Err(StorageError::WebHdfs {
                op: "RENAME",
                status: StatusCode::OK.as_u16(),
                message: format!("rename of {} to {} was refused", temp, target),
            });
        }
        Ok(())
    }

    /// Best-effort removal of an unpublished temp file
    async fn discard(&self, temp: &str) {
        let removed = match self.call(Method::DELETE, temp, "DELETE", &[]).await {
            Ok(response) => check(response, "DELETE").await.map(drop),
            Err(e) => Err(e),
        };
        if let Err(e) = removed {
            warn!("Failed to remove temp file {}: {}", temp, e);
        }
    }

    async fn expect_boolean(&self, response: Response, op: &'static str) -> Result<bool, StorageError> {
        let response = check(response, op).await?;
        Ok(response.json::<BooleanResponse>().await?.boolean)
    }
}

/// Turn a non-success response into a `StorageError::WebHdfs`
async fn check(response: Response, op: &'static str) -> Result<Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StorageError::WebHdfs {
        op,
        status: status.as_u16(),
        message: remote_exception_message(&body),
    })
}

fn remote_exception_message(body: &str) -> String {
    match serde_json::from_str::<RemoteExceptionBody>(body) {
        Ok(RemoteExceptionBody { exception }) => format!("{}: {}", exception.exception, exception.message),
        Err(_) => body.trim().to_string(),
    }
}

fn parse_days(body: &[u8]) -> Result<Vec<Day>, StorageError> {
    let listing: FileStatuses = serde_json::from_slice(body)
        .map_err(|e| StorageError::Corrupt(format!("unreadable LISTSTATUS response: {}", e)))?;

    let mut days: Vec<Day> = listing
        .statuses
        .entries
        .into_iter()
        .filter(|status| status.kind == "FILE" && !status.path_suffix.starts_with('.'))
        .filter_map(|status| match status.path_suffix.parse::<Day>() {
            Ok(day) => Some(day),
            Err(_) => {
                warn!("Ignoring unexpected HDFS file {}", status.path_suffix);
                None
            }
        })
        .collect();
    days.sort();
    Ok(days)
}

#[async_trait]
impl StorageBackend for HdfsStore {
    fn name(&self) -> &'static str {
        "hdfs"
    }

    async fn write_file(&self, key: &PartitionKey, payload: Bytes) -> Result<(), StorageError> {
        let stream_dir = self.stream_path(key.stream_id);
        let target = self.partition_path(key);
        let temp = format!("{}/.{}.tmp-{}", stream_dir, key.day, Uuid::new_v4());
        let len = payload.len();

        let response = self.call(Method::PUT, &stream_dir, "MKDIRS", &[]).await?;
        self.expect_boolean(response, "MKDIRS").await?;

        if let Err(e) = self.publish(&temp, &target, payload).await {
            self.discard(&temp).await;
            return Err(e);
        }

        debug!("Wrote {} bytes to {}", len, self.partition_url(key));
        Ok(())
    }

    async fn read_partition(&self, key: &PartitionKey) -> Result<Option<Bytes>, StorageError> {
        let path = self.partition_path(key);
        let response = self.call(Method::GET, &path, "OPEN", &[]).await?;
        let response = self.follow(response, Method::GET, "OPEN", None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let data = check(response, "OPEN").await?.bytes().await?;
        debug!("Read {} bytes from {}", data.len(), self.partition_url(key));
        Ok(Some(data))
    }

    async fn list_days(&self, stream_id: Uuid) -> Result<Vec<Day>, StorageError> {
        let response = self
            .call(Method::GET, &self.stream_path(stream_id), "LISTSTATUS", &[])
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let body = check(response, "LISTSTATUS").await?.bytes().await?;
        parse_days(&body)
    }
}
