//! Decoded samples of a stream

use chrono::serde::ts_microseconds;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// Largest accepted distance of a sample's local time from UTC
pub const MAX_OFFSET_MS: i64 = 14 * 60 * 60 * 1000;

/// One timestamped sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    #[serde(with = "ts_microseconds")]
    pub start_time: DateTime<Utc>,
    /// Milliseconds between the sample's local time and UTC
    pub offset: i64,
    pub sample: SampleValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SampleValue {
    Float(f64),
    Int(i64),
    Text(String),
    Vector(Vec<f64>),
    Json(#[serde(with = "json_text")] serde_json::Value),
}

impl DataPoint {
    pub fn new(start_time: DateTime<Utc>, offset: i64, sample: SampleValue) -> Self {
        Self {
            start_time,
            offset,
            sample,
        }
    }

    pub fn has_valid_offset(&self) -> bool {
        self.offset.abs() <= MAX_OFFSET_MS
    }

    /// Start time in the sample's own time zone, when the offset is usable
    pub fn local_start_time(&self) -> Option<DateTime<FixedOffset>> {
        if !self.has_valid_offset() {
            return None;
        }
        let seconds = i32::try_from(self.offset / 1000).ok()?;
        FixedOffset::east_opt(seconds).map(|zone| self.start_time.with_timezone(&zone))
    }
}

/// bincode cannot decode self-describing values, so JSON samples travel as text.
mod json_text {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &serde_json::Value, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<serde_json::Value, D::Error> {
        let text = String::deserialize(deserializer)?;
        serde_json::from_str(&text).map_err(D::Error::custom)
    }
}
