// src/lib.rs

pub mod app_state;
pub mod config;
pub mod datapoint;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod service;
pub mod storage;
pub mod util;

pub use app_state::AppState;
pub use config::AppConfig;
pub use datapoint::{DataPoint, SampleValue};
pub use error::{Error, MetadataError, StorageError};
pub use metadata::{MetadataStore, StreamIdentity, StreamMetadata, StreamRecord};
pub use service::{DataSet, DataStream, StreamHandler};
pub use storage::{Day, Partition, PartitionKey, ReadRequest, StorageBackend};
