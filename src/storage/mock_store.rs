//! In-memory implementation of StorageBackend for testing

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use log::info;
use uuid::Uuid;

use crate::error::StorageError;
use crate::storage::{Day, PartitionKey, StorageBackend};

/// Mock implementation of StorageBackend for testing.
///
/// Never selectable from configuration. Counts calls and can be told to fail
/// writes or reads. Writes and reads yield to the scheduler once, like a
/// network round trip would.
pub struct MockStorageBackend {
    // stream_id -> day -> payload
    data: Arc<Mutex<HashMap<Uuid, BTreeMap<Day, Bytes>>>>,
    writes: AtomicUsize,
    reads: AtomicUsize,
    lists: AtomicUsize,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MockStorageBackend {
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(HashMap::new())),
            writes: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        }
    }

    /// Make every following write fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every following read and listing fail
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of write_file calls, failed ones included
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of read_partition calls, failed ones included
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn list_count(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    /// Number of stored partitions across all streams
    pub fn partition_count(&self) -> usize {
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.values().map(BTreeMap::len).sum()
    }

    /// Stored payload, bypassing counters and failure injection
    pub fn get(&self, key: &PartitionKey) -> Option<Bytes> {
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.get(&key.stream_id).and_then(|days| days.get(&key.day)).cloned()
    }

    /// Clear all data from the store
    pub fn clear(&self) {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.clear();
    }
}

impl Default for MockStorageBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MockStorageBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn write_file(&self, key: &PartitionKey, payload: Bytes) -> Result<(), StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("mock write failure".to_string()));
        }
        tokio::task::yield_now().await;

        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.entry(key.stream_id).or_default().insert(key.day, payload);
        info!("Mock: stored partition {}", key);
        Ok(())
    }

    async fn read_partition(&self, key: &PartitionKey) -> Result<Option<Bytes>, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("mock read failure".to_string()));
        }
        tokio::task::yield_now().await;
        Ok(self.get(key))
    }

    async fn list_days(&self, stream_id: Uuid) -> Result<Vec<Day>, StorageError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("mock list failure".to_string()));
        }
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(data
            .get(&stream_id)
            .map(|days| days.keys().copied().collect())
            .unwrap_or_default())
    }
}
