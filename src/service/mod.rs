//! Stream service layer: the façade callers use to save and read streams

pub mod stream_handler;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::metadata::{StreamIdentity, StreamMetadata};
use crate::storage::Partition;

pub use stream_handler::StreamHandler;

/// Which parts of a stream a read materializes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataSet {
    #[default]
    Complete,
    OnlyData,
    OnlyMetadata,
}

impl DataSet {
    pub fn includes_data(&self) -> bool {
        matches!(self, DataSet::Complete | DataSet::OnlyData)
    }

    pub fn includes_metadata(&self) -> bool {
        matches!(self, DataSet::Complete | DataSet::OnlyMetadata)
    }
}

impl FromStr for DataSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "COMPLETE" => Ok(DataSet::Complete),
            "ONLY_DATA" => Ok(DataSet::OnlyData),
            "ONLY_METADATA" => Ok(DataSet::OnlyMetadata),
            _ => Err(Error::Validation(format!(
                "invalid data set mode '{}', expected COMPLETE, ONLY_DATA or ONLY_METADATA",
                s
            ))),
        }
    }
}

impl fmt::Display for DataSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataSet::Complete => "COMPLETE",
            DataSet::OnlyData => "ONLY_DATA",
            DataSet::OnlyMetadata => "ONLY_METADATA",
        })
    }
}

/// Result of a stream read
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataStream {
    pub identity: Option<StreamIdentity>,
    /// Present unless the read was `OnlyData`
    pub metadata: Option<StreamMetadata>,
    /// Partitions ordered by day; empty for `OnlyMetadata`
    pub data: Vec<Partition>,
}

impl DataStream {
    /// The "stream not found" result
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.identity.is_none() && self.metadata.is_none() && self.data.is_empty()
    }

    /// All partition payloads joined in day order
    pub fn payload(&self) -> Vec<u8> {
        self.data.iter().flat_map(|partition| partition.payload.iter().copied()).collect()
    }
}
