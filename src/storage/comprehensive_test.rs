//! Comprehensive tests for the storage abstraction layer

#[cfg(test)]
mod integration_tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;
    use uuid::Uuid;

    use crate::config::FilesystemConfig;
    use crate::storage::local_store::LocalFilesystemStore;
    use crate::storage::mock_store::MockStorageBackend;
    use crate::storage::{Day, PartitionKey, ReadRequest, StorageBackend};

    fn day(s: &str) -> Day {
        s.parse().unwrap()
    }

    fn backends(dir: &std::path::Path) -> Vec<Arc<dyn StorageBackend>> {
        let local = LocalFilesystemStore::new(&FilesystemConfig {
            filesystem_path: dir.to_string_lossy().into_owned(),
        })
        .expect("Local store failed to open");
        let mock: Arc<dyn StorageBackend> = Arc::new(MockStorageBackend::new());
        vec![mock, Arc::new(local) as Arc<dyn StorageBackend>]
    }

    #[tokio::test]
    async fn test_storage_abstraction_end_to_end() {
        let dir = tempdir().unwrap();
        for store in backends(dir.path()) {
            let stream_id = Uuid::new_v4();
            let key = PartitionKey::new(stream_id, day("2024-01-01"));

            store.write_file(&key, Bytes::from_static(b"\x01\x02\x03")).await.expect("Write failed");

            let partitions = store.read_file(&ReadRequest::all(stream_id)).await.expect("Read failed");
            assert_eq!(partitions.len(), 1, "backend {}", store.name());
            assert_eq!(partitions[0].day, day("2024-01-01"));
            assert_eq!(partitions[0].payload, Bytes::from_static(b"\x01\x02\x03"));
        }
    }

    #[tokio::test]
    async fn test_overwrite_replaces_partition() {
        let dir = tempdir().unwrap();
        for store in backends(dir.path()) {
            let key = PartitionKey::new(Uuid::new_v4(), day("2024-01-01"));
            store.write_file(&key, Bytes::from_static(b"first version")).await.unwrap();
            store.write_file(&key, Bytes::from_static(b"v2")).await.unwrap();

            assert_eq!(
                store.read_partition(&key).await.unwrap(),
                Some(Bytes::from_static(b"v2")),
                "backend {}",
                store.name()
            );
        }
    }

    #[tokio::test]
    async fn test_read_file_orders_and_filters_days() {
        let dir = tempdir().unwrap();
        for store in backends(dir.path()) {
            let stream_id = Uuid::new_v4();
            for (d, payload) in [("2024-01-03", "c"), ("2024-01-01", "a"), ("2024-01-02", "b")] {
                let key = PartitionKey::new(stream_id, day(d));
                store.write_file(&key, Bytes::from(payload)).await.unwrap();
            }

            let all = store.read_file(&ReadRequest::all(stream_id)).await.unwrap();
            let payloads: Vec<&[u8]> = all.iter().map(|p| p.payload.as_ref()).collect();
            assert_eq!(payloads, vec![&b"a"[..], &b"b"[..], &b"c"[..]]);

            let mut window = ReadRequest::all(stream_id);
            window.start_time = Some(Utc.with_ymd_and_hms(2024, 1, 2, 6, 0, 0).unwrap());
            let tail = store.read_file(&window).await.unwrap();
            let days: Vec<Day> = tail.iter().map(|p| p.day).collect();
            assert_eq!(days, vec![day("2024-01-02"), day("2024-01-03")]);

            let mut single = ReadRequest::all(stream_id);
            single.day = Some(day("2024-01-05"));
            assert!(store.read_file(&single).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_concurrent_writes_to_different_keys() {
        let dir = tempdir().unwrap();
        let store = Arc::new(
            LocalFilesystemStore::new(&FilesystemConfig {
                filesystem_path: dir.path().to_string_lossy().into_owned(),
            })
            .unwrap(),
        );
        let stream_id = Uuid::new_v4();

        let mut handles = vec![];
        for i in 1..=10u32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let key = PartitionKey::new(stream_id, day(&format!("2024-01-{:02}", i)));
                store.write_file(&key, Bytes::from(vec![i as u8; 64])).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().expect("Concurrent write failed");
        }

        assert_eq!(store.list_days(stream_id).await.unwrap().len(), 10);
        assert_eq!(store.locks().active(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_writes_to_same_key() {
        let dir = tempdir().unwrap();
        let store = Arc::new(
            LocalFilesystemStore::new(&FilesystemConfig {
                filesystem_path: dir.path().to_string_lossy().into_owned(),
            })
            .unwrap(),
        );
        let key = PartitionKey::new(Uuid::new_v4(), day("2024-01-01"));

        let mut handles = vec![];
        for i in 0..8u8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.write_file(&key, Bytes::from(vec![i; 4096])).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Exactly one writer's payload survives, never a mix.
        let stored = store.read_partition(&key).await.unwrap().unwrap();
        assert_eq!(stored.len(), 4096);
        assert!(stored.iter().all(|b| *b == stored[0]));
        assert_eq!(store.list_days(key.stream_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let store = MockStorageBackend::new();
        let key = PartitionKey::new(Uuid::new_v4(), day("2024-01-01"));

        store.fail_writes(true);
        assert!(store.write_file(&key, Bytes::from_static(b"x")).await.is_err());
        assert_eq!(store.partition_count(), 0);

        store.fail_writes(false);
        store.write_file(&key, Bytes::from_static(b"x")).await.unwrap();
        assert_eq!(store.write_count(), 2);

        store.fail_reads(true);
        assert!(store.read_file(&ReadRequest::all(key.stream_id)).await.is_err());
        assert_eq!(store.list_count(), 1);
        assert_eq!(store.read_count(), 0);
    }
}
