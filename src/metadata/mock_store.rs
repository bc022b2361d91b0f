//! Mock implementation of MetadataStore for testing

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::MetadataError;
use crate::metadata::{check_identity, MetadataStore, StreamIdentity, StreamRecord};

/// Mock implementation of MetadataStore for testing
pub struct MockMetadataStore {
    data: Arc<Mutex<HashMap<Uuid, StreamRecord>>>,
    saves: AtomicUsize,
    lookups: AtomicUsize,
    fail_saves: AtomicBool,
    fail_reads: AtomicBool,
}

impl MockMetadataStore {
    /// Create a new mock metadata store
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(HashMap::new())),
            saves: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
            fail_saves: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        }
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of save_metadata calls, failed ones included
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Number of lookups of any kind
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Number of stored records
    pub fn record_count(&self) -> usize {
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.len()
    }

    /// Clear all data from the store (useful for test cleanup)
    pub fn clear(&self) {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.clear();
    }

    fn begin_read(&self) -> Result<(), MetadataError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(MetadataError::Unavailable("mock read failure".to_string()));
        }
        Ok(())
    }
}

impl Default for MockMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataStore for MockMetadataStore {
    async fn get_metadata_by_stream_name(&self, name: &str) -> Result<Option<StreamRecord>, MetadataError> {
        self.begin_read()?;
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(data.values().find(|record| record.identity.name == name).cloned())
    }

    async fn get_metadata_by_stream_id(&self, stream_id: Uuid) -> Result<Option<StreamRecord>, MetadataError> {
        self.begin_read()?;
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(data.get(&stream_id).cloned())
    }

    async fn save_metadata(&self, record: &StreamRecord) -> Result<(), MetadataError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(MetadataError::Unavailable("mock save failure".to_string()));
        }

        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        let by_id = data.get(&record.identity.stream_id).map(|r| &r.identity);
        let by_name = data
            .values()
            .find(|r| r.identity.name == record.identity.name)
            .map(|r| &r.identity);
        check_identity(&record.identity, by_id, by_name)?;

        data.insert(record.identity.stream_id, record.clone());
        Ok(())
    }

    async fn list_streams_by_owner(&self, owner_id: Uuid) -> Result<Vec<StreamIdentity>, MetadataError> {
        self.begin_read()?;
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        let mut identities: Vec<StreamIdentity> = data
            .values()
            .filter(|record| record.identity.owner_id == owner_id)
            .map(|record| record.identity.clone())
            .collect();
        identities.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(identities)
    }
}
