//! Raw Payload Storage Layer Abstraction
//!
//! This module provides an abstraction over the bulk stores that hold raw
//! stream payloads. Every backend addresses data by `(stream_id, day)` and
//! exposes the same write/read contract, so the stream handler never needs
//! to know which one is live.

pub mod config;
pub mod hdfs_store;
pub mod key_lock;
pub mod local_store;
pub mod mock_store;
pub mod s3_store;

#[cfg(test)]
mod comprehensive_test;
#[cfg(test)]
pub(crate) mod fake_http;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Days, NaiveDate, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, StorageError};

pub use config::{select_backend, BackendKind};

/// Calendar-day partition key, rendered as `YYYYMMDD` in storage addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Day(NaiveDate);

impl Day {
    pub fn from_date(date: NaiveDate) -> Self {
        Day(date)
    }

    /// Day containing the given instant (UTC).
    pub fn of(timestamp: DateTime<Utc>) -> Self {
        Day(timestamp.date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// First instant of the day.
    pub fn start(&self) -> DateTime<Utc> {
        self.0.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// First instant of the following day.
    pub fn end_exclusive(&self) -> DateTime<Utc> {
        match self.0.checked_add_days(Days::new(1)) {
            Some(next) => next.and_time(chrono::NaiveTime::MIN).and_utc(),
            None => chrono::NaiveDateTime::MAX.and_utc(),
        }
    }
}

impl FromStr for Day {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let dashed = if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
            format!("{}-{}-{}", &s[..4], &s[4..6], &s[6..])
        } else {
            s.to_string()
        };
        NaiveDate::parse_from_str(&dashed, "%Y-%m-%d")
            .map(Day)
            .map_err(|_| Error::Validation(format!("invalid day '{}', expected YYYY-MM-DD or YYYYMMDD", s)))
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y%m%d"))
    }
}

/// Address of one stored partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    pub stream_id: Uuid,
    pub day: Day,
}

impl PartitionKey {
    pub fn new(stream_id: Uuid, day: Day) -> Self {
        Self { stream_id, day }
    }

    /// `<stream_id>/<day>`, the backend-independent part of every address.
    pub fn relative_path(&self) -> String {
        format!("{}/{}", self.stream_id, self.day)
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.relative_path())
    }
}

/// Payload of one day of a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub day: Day,
    pub payload: Bytes,
}

/// Which partitions of a stream to read.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRequest {
    pub stream_id: Uuid,
    /// Single day to read; every stored day when absent
    pub day: Option<Day>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl ReadRequest {
    /// Every partition of the stream.
    pub fn all(stream_id: Uuid) -> Self {
        Self {
            stream_id,
            day: None,
            start_time: None,
            end_time: None,
        }
    }

    /// Whether the day overlaps the requested time window.
    pub fn includes(&self, day: Day) -> bool {
        let after_start = self.start_time.map_or(true, |start| start < day.end_exclusive());
        let before_end = self.end_time.map_or(true, |end| end >= day.start());
        after_start && before_end
    }
}

/// Trait defining the raw payload storage interface
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Replace the whole partition with `payload`. Readers see either the
    /// previous or the new content, never a mix.
    async fn write_file(&self, key: &PartitionKey, payload: Bytes) -> Result<(), StorageError>;

    /// Read one partition; `None` when nothing is stored for the key
    async fn read_partition(&self, key: &PartitionKey) -> Result<Option<Bytes>, StorageError>;

    /// Days with a stored partition, ascending
    async fn list_days(&self, stream_id: Uuid) -> Result<Vec<Day>, StorageError>;

    /// Read the partitions selected by `request`, ordered by day
    async fn read_file(&self, request: &ReadRequest) -> Result<Vec<Partition>, StorageError> {
        let days: Vec<Day> = match request.day {
            Some(day) if request.includes(day) => vec![day],
            Some(_) => Vec::new(),
            None => self
                .list_days(request.stream_id)
                .await?
                .into_iter()
                .filter(|day| request.includes(*day))
                .collect(),
        };

        let reads = days.into_iter().map(|day| async move {
            let key = PartitionKey::new(request.stream_id, day);
            self.read_partition(&key)
                .await
                .map(|payload| payload.map(|payload| Partition { day, payload }))
        });

        Ok(try_join_all(reads).await?.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_day_parsing() {
        let dashed: Day = "2024-01-01".parse().unwrap();
        let compact: Day = "20240101".parse().unwrap();
        assert_eq!(dashed, compact);
        assert_eq!(dashed.to_string(), "20240101");

        assert!("2024-13-01".parse::<Day>().is_err());
        assert!("yesterday".parse::<Day>().is_err());
        assert!("../../etc".parse::<Day>().is_err());
    }

    #[test]
    fn test_day_bounds() {
        let day: Day = "2024-02-28".parse().unwrap();
        assert_eq!(day.start(), Utc.with_ymd_and_hms(2024, 2, 28, 0, 0, 0).unwrap());
        assert_eq!(day.end_exclusive(), Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap());
        assert_eq!(Day::of(Utc.with_ymd_and_hms(2024, 2, 28, 23, 59, 59).unwrap()), day);
    }

    #[test]
    fn test_partition_key_path() {
        let stream_id = Uuid::parse_str("6f1c1d0e-3c2f-4c9a-9a43-2d1f0f6b7a10").unwrap();
        let key = PartitionKey::new(stream_id, "2024-01-01".parse().unwrap());
        assert_eq!(key.relative_path(), "6f1c1d0e-3c2f-4c9a-9a43-2d1f0f6b7a10/20240101");
    }

    #[test]
    fn test_read_request_window() {
        let mut request = ReadRequest::all(Uuid::new_v4());
        let jan1: Day = "2024-01-01".parse().unwrap();
        let jan2: Day = "2024-01-02".parse().unwrap();
        let jan3: Day = "2024-01-03".parse().unwrap();
        assert!(request.includes(jan1));

        request.start_time = Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
        request.end_time = Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        assert!(request.includes(jan1));
        assert!(request.includes(jan2));
        assert!(!request.includes(jan3));
    }
}
