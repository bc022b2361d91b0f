//! Stream handler that saves and reads streams across the payload backend
//! and the metadata store

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use log::{debug, error, info, Level};
use uuid::Uuid;

use crate::datapoint::DataPoint;
use crate::error::Error;
use crate::logging::stream_log;
use crate::metadata::{check_identity, MetadataStore, StreamIdentity, StreamMetadata, StreamRecord};
use crate::service::{DataSet, DataStream};
use crate::storage::{Day, PartitionKey, ReadRequest, StorageBackend};
use crate::util::serializer::{decode_samples, encode_samples};

/// Façade over one payload backend and one metadata store.
///
/// Holds no state besides the two collaborators, so every call re-reads
/// current truth from them.
pub struct StreamHandler {
    backend: Arc<dyn StorageBackend>,
    metadata_store: Arc<dyn MetadataStore>,
}

fn validate_name(name: &str) -> Result<(), Error> {
    if name.trim().is_empty() {
        return Err(Error::Validation("stream name must not be empty".to_string()));
    }
    Ok(())
}

fn validate_window(start_time: Option<DateTime<Utc>>, end_time: Option<DateTime<Utc>>) -> Result<(), Error> {
    if let (Some(start), Some(end)) = (start_time, end_time) {
        if start > end {
            return Err(Error::Validation(format!(
                "start_time {} is after end_time {}",
                start, end
            )));
        }
    }
    Ok(())
}

impl StreamHandler {
    pub fn new(backend: Arc<dyn StorageBackend>, metadata_store: Arc<dyn MetadataStore>) -> Self {
        info!("Stream handler using {} backend", backend.name());
        Self {
            backend,
            metadata_store,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Store one day of a stream's payload, then its metadata.
    ///
    /// An identity that clashes with a registered stream is rejected before
    /// anything is written. The payload is written first. When the metadata
    /// write fails afterwards
    /// the payload stays in place and `Error::MetadataWrite` carries the
    /// record so it can be saved again without resending the payload.
    pub async fn save_stream(
        &self,
        identity: &StreamIdentity,
        day: Day,
        payload: Bytes,
        metadata: StreamMetadata,
    ) -> Result<(), Error> {
        validate_name(&identity.name)?;
        if payload.is_empty() {
            return Err(Error::Validation(format!(
                "refusing to save an empty payload for stream {}",
                identity.name
            )));
        }
        let day_label = day.to_string();
        self.check_registration(identity).await?;

        let key = PartitionKey::new(identity.stream_id, day);
        let size = payload.len();
        if let Err(e) = self.backend.write_file(&key, payload).await {
            stream_log!(
                Level::Warn,
                &identity.name,
                Some(&day_label),
                "Payload write of {} failed on {}: {}",
                key,
                self.backend.name(),
                e
            );
            return Err(Error::storage_write(key, e));
        }
        stream_log!(Level::Debug, &identity.name, Some(&day_label), "Stored {} bytes for {}", size, key);

        let record = StreamRecord {
            identity: identity.clone(),
            metadata,
        };
        if let Err(e) = self.metadata_store.save_metadata(&record).await {
            stream_log!(
                Level::Error,
                &identity.name,
                Some(&day_label),
                "Inconsistent stream {}: payload {} is stored but metadata write failed: {}",
                identity.name,
                key,
                e
            );
            return Err(Error::MetadataWrite {
                record: Box::new(record),
                source: e,
            });
        }

        stream_log!(
            Level::Info,
            &identity.name,
            Some(&day_label),
            "Saved stream {} partition {}",
            identity.name,
            day
        );
        Ok(())
    }

    /// Read a stream by name.
    ///
    /// An unknown name yields `DataStream::empty()`. `day`, `start_time` and
    /// `end_time` select whole partitions; use `get_stream_samples` for exact
    /// time filtering.
    pub async fn get_stream(
        &self,
        name: &str,
        day: Option<Day>,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        mode: DataSet,
    ) -> Result<DataStream, Error> {
        validate_name(name)?;
        validate_window(start_time, end_time)?;
        let day_label = day.map(|d| d.to_string());

        let Some(record) = self.lookup(name).await? else {
            stream_log!(Level::Debug, name, day_label.as_deref(), "Stream {} not found", name);
            return Ok(DataStream::empty());
        };

        let data = if mode.includes_data() {
            let request = ReadRequest {
                stream_id: record.identity.stream_id,
                day,
                start_time,
                end_time,
            };
            self.backend
                .read_file(&request)
                .await
                .map_err(|e| Error::storage_read(record.identity.stream_id, e))?
        } else {
            Vec::new()
        };
        stream_log!(
            Level::Debug,
            name,
            day_label.as_deref(),
            "Read {} partitions of {} ({})",
            data.len(),
            name,
            mode
        );

        Ok(DataStream {
            identity: Some(record.identity),
            metadata: mode.includes_metadata().then_some(record.metadata),
            data,
        })
    }

    /// Decoded samples of a stream within `[start_time, end_time]`, sorted by
    /// start time. Samples with equal start times keep their stored order.
    pub async fn get_stream_samples(
        &self,
        name: &str,
        day: Option<Day>,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<DataPoint>, Error> {
        let stream = self
            .get_stream(name, day, start_time, end_time, DataSet::OnlyData)
            .await?;

        let mut samples = Vec::new();
        for partition in &stream.data {
            let decoded = decode_samples(&partition.payload).map_err(|e| {
                error!("Partition {} of {} is not decodable: {}", partition.day, name, e);
                e
            })?;
            samples.extend(decoded.into_iter().filter(|point| {
                start_time.map_or(true, |start| point.start_time >= start)
                    && end_time.map_or(true, |end| point.start_time <= end)
            }));
        }
        samples.sort_by_key(|point| point.start_time);
        Ok(samples)
    }

    /// Encode typed samples for one day and save them with `save_stream`.
    ///
    /// Fills `metadata.start_time`/`end_time` when unset, widening the range
    /// already recorded for the stream so it covers every saved day.
    pub async fn save_samples(
        &self,
        identity: &StreamIdentity,
        day: Day,
        mut samples: Vec<DataPoint>,
        mut metadata: StreamMetadata,
    ) -> Result<(), Error> {
        if samples.is_empty() {
            return Err(Error::Validation(format!(
                "refusing to save an empty sample list for stream {}",
                identity.name
            )));
        }
        if let Some(point) = samples.iter().find(|point| !point.has_valid_offset()) {
            return Err(Error::Validation(format!(
                "sample at {} has offset {}ms outside of +/-14h",
                point.start_time, point.offset
            )));
        }
        if let Some(point) = samples.iter().find(|point| Day::of(point.start_time) != day) {
            return Err(Error::Validation(format!(
                "sample at {} does not belong to day {}",
                point.start_time, day
            )));
        }

        samples.sort_by_key(|point| point.start_time);
        if metadata.start_time.is_none() || metadata.end_time.is_none() {
            let stored = self
                .metadata_store
                .get_metadata_by_stream_id(identity.stream_id)
                .await
                .map_err(Error::MetadataRead)?
                .map(|record| record.metadata);
            let (stored_start, stored_end) = stored.map_or((None, None), |m| (m.start_time, m.end_time));

            let first = samples.first().map(|point| point.start_time);
            let last = samples.last().map(|point| point.start_time);
            if metadata.start_time.is_none() {
                metadata.start_time = first.into_iter().chain(stored_start).min();
            }
            if metadata.end_time.is_none() {
                metadata.end_time = last.into_iter().chain(stored_end).max();
            }
        }

        let payload = encode_samples(&samples)?;
        self.save_stream(identity, day, payload, metadata).await
    }

    /// Identity registered under `name`, or a new one for `owner_id`.
    ///
    /// Nothing is stored until the first successful save.
    pub async fn resolve_identity(&self, name: &str, owner_id: Uuid) -> Result<StreamIdentity, Error> {
        validate_name(name)?;
        match self.lookup(name).await? {
            Some(record) if record.identity.owner_id == owner_id => Ok(record.identity),
            Some(_) => Err(Error::Validation(format!(
                "stream name {} is already taken by another owner; names are unique across all owners",
                name
            ))),
            None => {
                let identity = StreamIdentity::new(name, owner_id);
                debug!("Minted stream id {} for {}", identity.stream_id, name);
                Ok(identity)
            }
        }
    }

    pub async fn is_stream(&self, name: &str) -> Result<bool, Error> {
        validate_name(name)?;
        Ok(self.lookup(name).await?.is_some())
    }

    pub async fn get_stream_id(&self, name: &str) -> Result<Option<Uuid>, Error> {
        validate_name(name)?;
        Ok(self.lookup(name).await?.map(|record| record.identity.stream_id))
    }

    /// Streams owned by `owner_id`, ordered by name
    pub async fn get_user_streams(&self, owner_id: Uuid) -> Result<Vec<StreamIdentity>, Error> {
        self.metadata_store
            .list_streams_by_owner(owner_id)
            .await
            .map_err(Error::MetadataRead)
    }

    /// Days with a stored partition; empty for an unknown stream
    pub async fn get_stream_days(&self, name: &str) -> Result<Vec<Day>, Error> {
        validate_name(name)?;
        let Some(record) = self.lookup(name).await? else {
            return Ok(Vec::new());
        };
        let stream_id = record.identity.stream_id;
        self.backend
            .list_days(stream_id)
            .await
            .map_err(|e| Error::storage_read(stream_id, e))
    }

    /// Reject an identity that would re-point a registered name or id
    async fn check_registration(&self, identity: &StreamIdentity) -> Result<(), Error> {
        let by_id = self
            .metadata_store
            .get_metadata_by_stream_id(identity.stream_id)
            .await
            .map_err(Error::MetadataRead)?;
        let by_name = self.lookup(&identity.name).await?;

        check_identity(
            identity,
            by_id.as_ref().map(|record| &record.identity),
            by_name.as_ref().map(|record| &record.identity),
        )
        .map_err(|e| {
            stream_log!(Level::Warn, &identity.name, None, "Rejected save of {}: {}", identity.stream_id, e);
            Error::Validation(e.to_string())
        })
    }

    async fn lookup(&self, name: &str) -> Result<Option<StreamRecord>, Error> {
        self.metadata_store
            .get_metadata_by_stream_name(name)
            .await
            .map_err(Error::MetadataRead)
    }
}
